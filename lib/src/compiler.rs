/*!
This module provides a compiler that takes the [`Ast`] of a regular
expression and produces a sequence of instructions for the Pike VM.

The compiler is based on [Thompson's construction][1]: each AST node is
lowered into a contiguous block of instructions, and blocks are glued
together with `jump` and `split` instructions whose targets are patched
once they are known. The ordering of split targets is what encodes match
priority: the first target of a split is always tried before the second,
which makes earlier alternatives win over later ones and greedy
repetitions prefer one more iteration.

[1]: https://en.wikipedia.org/wiki/Thompson%27s_construction
*/

use std::fmt::{Display, Formatter};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use bitvec::array::BitArray;
use bitvec::order::Lsb0;
use thiserror::Error;

use crate::ast::{AssertionKind, Ast, ClassSet};
use crate::instr;
use crate::instr::{Instr, InstrParser, NumAlt, SplitId, OPCODE_PREFIX};

/// Maximum number of alternatives in an alternation (e.g: `foo|bar|baz`
/// has 3 alternatives).
pub(crate) const MAX_ALTERNATIVES: u8 = 255;

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum Error {
    /// The regular expression is too large.
    #[error("regexp too large")]
    TooLarge,

    #[error("too many alternatives in alternation (max: 255)")]
    TooManyAlternatives,
}

/// Compiles the AST of a regular expression into code for the Pike VM.
///
/// Compilation is a depth-first traversal of the AST that emits the
/// instruction block for each node. Instructions that jump forward are
/// emitted with a placeholder offset that is patched as soon as the
/// destination address is known.
#[derive(Default)]
pub(crate) struct Compiler {
    code: InstrSeq,
}

impl Compiler {
    /// Creates a new compiler.
    pub fn new() -> Self {
        Self { code: InstrSeq::new() }
    }

    /// Compiles the given AST, returning the code for the Pike VM.
    ///
    /// The whole-pattern block is followed by a single `MATCH` instruction
    /// that ends the execution.
    pub fn compile(mut self, ast: &Ast) -> Result<InstrSeq, Error> {
        self.emit_ast(ast)?;
        self.code.emit_instr(Instr::MATCH)?;
        Ok(self.code)
    }

    #[inline]
    fn location(&self) -> usize {
        self.code.location()
    }

    /// Returns the offset that takes from the instruction at `from` to the
    /// instruction at `to`.
    fn offset(from: usize, to: usize) -> Result<instr::Offset, Error> {
        (to as isize - from as isize)
            .try_into()
            .map_err(|_| Error::TooLarge)
    }

    fn emit_ast(&mut self, ast: &Ast) -> Result<(), Error> {
        match ast {
            Ast::Empty => {}
            Ast::Literal(byte) => {
                self.code.emit_literal(std::iter::once(byte));
            }
            Ast::Any => {
                self.code.emit_instr(Instr::ANY_BYTE)?;
            }
            Ast::Class { set, negated } => {
                // The code has no notion of negated classes; a negated
                // class is emitted as the complement of its set.
                if *negated {
                    self.code.emit_class(&set.complement());
                } else {
                    self.code.emit_class(set);
                }
            }
            Ast::Assertion(kind) => {
                self.code.emit_instr(match kind {
                    AssertionKind::StartText => Instr::START,
                    AssertionKind::EndText => Instr::END,
                    AssertionKind::WordBoundary => Instr::WORD_BOUNDARY,
                    AssertionKind::NotWordBoundary => {
                        Instr::WORD_BOUNDARY_NEG
                    }
                })?;
            }
            Ast::Concat(nodes) => {
                for node in nodes {
                    self.emit_ast(node)?;
                }
            }
            Ast::Alternation(alternatives) => {
                self.emit_alternation(alternatives)?;
            }
            Ast::Repetition { min, max, greedy, ast } => {
                self.emit_repetition(*min, *max, *greedy, ast)?;
            }
        }

        Ok(())
    }

    fn emit_alternation(
        &mut self,
        alternatives: &[Ast],
    ) -> Result<(), Error> {
        // e1|e2|....|eN
        //
        // l0    : split_n l1,l2,...,lN
        // l1    : ... code for e1 ...
        //         jump l_end
        // l2    : ... code for e2 ...
        //         jump l_end
        //         ....
        // lN    : ... code for eN ...
        // l_end :
        debug_assert!(alternatives.len() > 1);

        if alternatives.len() > MAX_ALTERNATIVES as usize {
            return Err(Error::TooManyAlternatives);
        }

        let l0 = self.code.emit_split_n(alternatives.len() as NumAlt)?;

        let mut alt_locations = Vec::with_capacity(alternatives.len());
        let mut jumps = Vec::with_capacity(alternatives.len() - 1);

        for (i, alternative) in alternatives.iter().enumerate() {
            alt_locations.push(self.location());
            self.emit_ast(alternative)?;
            // The last alternative doesn't need a jump, it falls through
            // to the join point.
            if i < alternatives.len() - 1 {
                jumps.push(self.code.emit_instr(Instr::JUMP)?);
            }
        }

        let l_end = self.location();

        for jump in jumps {
            self.code.patch_instr(jump, Self::offset(jump, l_end)?);
        }

        let offsets = alt_locations
            .into_iter()
            .map(|loc| Self::offset(l0, loc))
            .collect::<Result<Vec<_>, _>>()?;

        self.code.patch_split_n(l0, offsets.into_iter());

        Ok(())
    }

    fn emit_repetition(
        &mut self,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        ast: &Ast,
    ) -> Result<(), Error> {
        match (min, max) {
            // e? and e??
            //
            // l1: split_a l2  ( split_b for the lazy e?? )
            //     ... code for e ...
            // l2:
            (0, Some(1)) => {
                let l1 = self.code.emit_instr(if greedy {
                    Instr::SPLIT_A
                } else {
                    Instr::SPLIT_B
                })?;
                self.emit_ast(ast)?;
                let l2 = self.location();
                self.code.patch_instr(l1, Self::offset(l1, l2)?);
            }
            // e* and e*?
            //
            // l1: split_a l3  ( split_b for the lazy e*? )
            //     ... code for e ...
            // l2: jump l1
            // l3:
            (0, None) => {
                let l1 = self.code.emit_instr(if greedy {
                    Instr::SPLIT_A
                } else {
                    Instr::SPLIT_B
                })?;
                self.emit_ast(ast)?;
                let l2 = self.code.emit_instr(Instr::JUMP)?;
                let l3 = self.location();
                self.code.patch_instr(l1, Self::offset(l1, l3)?);
                self.code.patch_instr(l2, Self::offset(l2, l1)?);
            }
            // e+ and e+?
            //
            // l1: ... code for e ...
            // l2: split_b l1  ( split_a for the lazy e+? )
            (1, None) => {
                let l1 = self.location();
                self.emit_ast(ast)?;
                let l2 = self.code.emit_instr(if greedy {
                    Instr::SPLIT_B
                } else {
                    Instr::SPLIT_A
                })?;
                self.code.patch_instr(l2, Self::offset(l2, l1)?);
            }
            // The parser doesn't produce any other combination.
            _ => unreachable!(),
        }

        Ok(())
    }
}

/// A sequence of instructions for the Pike VM.
///
/// This type is used by the compiler while emitting code. It is simply a
/// buffer with a set of specialized functions for adding instructions at
/// the end of the buffer, plus functions for going back and patching the
/// offset of instructions that point to other places within the code once
/// the destination is known.
#[derive(Default)]
pub(crate) struct InstrSeq {
    /// A vector that contains the VM code.
    seq: Cursor<Vec<u8>>,
    /// The ID that will identify the next split instruction emitted in
    /// this sequence.
    split_id: SplitId,
}

impl AsRef<[u8]> for InstrSeq {
    fn as_ref(&self) -> &[u8] {
        self.seq.get_ref().as_slice()
    }
}

impl InstrSeq {
    /// Creates a new [`InstrSeq`].
    pub fn new() -> Self {
        Self { seq: Cursor::new(Vec::new()), split_id: SplitId::default() }
    }

    /// Consumes the [`InstrSeq`] and returns the inner vector that
    /// contains the code.
    pub fn into_inner(self) -> Vec<u8> {
        self.seq.into_inner()
    }

    /// Returns the current location within the instruction sequence.
    ///
    /// The location is an offset relative to the sequence's starting
    /// point; the first instruction is at location 0. This function always
    /// returns the location where the next instruction will be put.
    #[inline]
    pub fn location(&self) -> usize {
        self.seq.position() as usize
    }

    /// Adds some instruction at the end of the sequence and returns the
    /// location where the newly added instruction resides.
    pub fn emit_instr(&mut self, instr: u8) -> Result<usize, Error> {
        // Store the position where the instruction will be written, which
        // will be the result of this function.
        let location = self.location();

        self.seq.write_all(&[OPCODE_PREFIX, instr]).unwrap();

        match instr {
            Instr::SPLIT_A | Instr::SPLIT_B => {
                // Split instructions are followed by a value that
                // identifies the split. Each split in the same pattern has
                // a unique value.
                self.seq
                    .write_all(self.split_id.to_le_bytes().as_slice())
                    .unwrap();
                // Increment the split ID, so that the next split has a
                // different ID.
                if let Some(incremented) = self.split_id.add(1) {
                    self.split_id = incremented
                } else {
                    return Err(Error::TooLarge);
                }
                // The split ID is followed by an offset that is relative
                // to the start of the instruction. The offset is unknown
                // at this point, and will be patched later.
                self.seq
                    .write_all(&[0x00; size_of::<instr::Offset>()])
                    .unwrap();
            }
            Instr::JUMP => {
                // Jump instructions are followed by an offset that is
                // relative to the start of the instruction.
                self.seq
                    .write_all(&[0x00; size_of::<instr::Offset>()])
                    .unwrap();
            }
            _ => {}
        }

        Ok(location)
    }

    /// Adds a [`Instr::SplitN`] instruction at the end of the sequence and
    /// returns the location where the newly added instruction resides.
    pub fn emit_split_n(&mut self, n: NumAlt) -> Result<usize, Error> {
        let location = self.location();

        self.seq.write_all(&[OPCODE_PREFIX, Instr::SPLIT_N]).unwrap();
        self.seq.write_all(self.split_id.to_le_bytes().as_slice()).unwrap();

        if let Some(incremented) = self.split_id.add(1) {
            self.split_id = incremented
        } else {
            return Err(Error::TooLarge);
        }

        self.seq.write_all(NumAlt::to_le_bytes(n).as_slice()).unwrap();

        for _ in 0..n {
            self.seq.write_all(&[0x00; size_of::<instr::Offset>()]).unwrap();
        }

        Ok(location)
    }

    /// Adds a [`Instr::ClassRanges`] or [`Instr::ClassBitmap`] instruction
    /// at the end of the sequence and returns the location where the newly
    /// added instruction resides.
    pub fn emit_class(&mut self, class: &ClassSet) -> usize {
        let location = self.location();
        let ranges = class.ranges();

        // When the number of ranges is < 16 `Instr::ClassRanges` is
        // preferred over `Instr::ClassBitmap` because of its more compact
        // representation. With 16 ranges or more `Instr::ClassBitmap`
        // becomes the more compact one.
        if ranges.len() < 16 {
            self.seq
                .write_all(&[
                    OPCODE_PREFIX,
                    Instr::CLASS_RANGES,
                    ranges.len() as u8,
                ])
                .unwrap();
            for range in ranges {
                self.seq.write_all(&[range.start, range.end]).unwrap();
            }
        } else {
            // Create a bitmap where the N-th bit is set if byte N is part
            // of any of the ranges in the class.
            let mut bitmap: BitArray<_, Lsb0> = BitArray::new([0_u8; 32]);
            for range in ranges {
                let range = range.start as usize..=range.end as usize;
                bitmap[range].fill(true);
            }
            self.seq.write_all(&[OPCODE_PREFIX, Instr::CLASS_BITMAP]).unwrap();
            self.seq.write_all(&bitmap.data).unwrap();
        }

        location
    }

    /// Adds instructions for matching a literal at the end of the
    /// sequence.
    pub fn emit_literal<'a, I: IntoIterator<Item = &'a u8>>(
        &mut self,
        literal: I,
    ) -> usize {
        let location = self.location();
        for byte in literal {
            // If the literal contains a byte that is equal to the opcode
            // prefix it is duplicated. This allows the VM to interpret
            // this byte as part of the literal, not as an instruction.
            if *byte == OPCODE_PREFIX {
                self.seq.write_all(&[*byte, *byte]).unwrap();
            } else {
                self.seq.write_all(&[*byte]).unwrap();
            }
        }
        location
    }

    /// Patches the offset of the instruction that starts at the given
    /// location.
    ///
    /// # Panics
    ///
    /// If the instruction at `location` is not one that has an offset as
    /// its argument, like [`Instr::Jump`], [`Instr::SplitA`] or
    /// [`Instr::SplitB`].
    pub fn patch_instr(&mut self, location: usize, offset: instr::Offset) {
        // Save the current position in order to restore it later.
        let saved_loc = self.location();

        // Seek to the position indicated by `location`.
        self.seq.seek(SeekFrom::Start(location as u64)).unwrap();

        let mut buf = [0; 2];
        self.seq.read_exact(&mut buf).unwrap();

        // Make sure that we have some `split` or `jump` instruction at
        // the given location.
        assert_eq!(buf[0], OPCODE_PREFIX);

        match buf[1] {
            Instr::JUMP => {}
            Instr::SPLIT_A | Instr::SPLIT_B => {
                // Skip the split ID.
                self.seq
                    .seek(SeekFrom::Current(size_of::<SplitId>() as i64))
                    .unwrap();
            }
            _ => {
                unreachable!()
            }
        }

        // Write the given offset after the instruction opcode. This will
        // overwrite any existing offset, usually initialized with 0.
        self.seq
            .write_all(instr::Offset::to_le_bytes(offset).as_slice())
            .unwrap();

        // Restore the previous position.
        self.seq.seek(SeekFrom::Start(saved_loc as u64)).unwrap();
    }

    /// Patches the offsets of the [`Instr::SplitN`] instruction at the
    /// given location.
    ///
    /// # Panics
    ///
    /// If the instruction at `location` is not [`Instr::SplitN`], or if
    /// the number of offsets provided is not the one that the instruction
    /// expects.
    pub fn patch_split_n<I: ExactSizeIterator<Item = instr::Offset>>(
        &mut self,
        location: usize,
        mut offsets: I,
    ) {
        // Save the current position in order to restore it later.
        let saved_loc = self.location();

        // Seek to the position indicated by `location`.
        self.seq.seek(SeekFrom::Start(location as u64)).unwrap();

        // Read the first few bytes of the instruction, corresponding to
        // the prefix, the opcode itself, and the split ID respectively.
        let mut opcode = [0; 2 + size_of::<SplitId>()];
        self.seq.read_exact(&mut opcode).unwrap();

        assert_eq!(opcode[0], OPCODE_PREFIX);
        assert_eq!(opcode[1], Instr::SPLIT_N);

        let mut buf = [0_u8; size_of::<NumAlt>()];
        self.seq.read_exact(&mut buf).unwrap();
        let n = NumAlt::from_le_bytes(buf);

        // Make sure that the number of offsets passed to this function is
        // equal to the number of alternatives.
        assert_eq!(n as usize, offsets.len());

        for _ in 0..n {
            self.seq
                .write_all(
                    instr::Offset::to_le_bytes(offsets.next().unwrap())
                        .as_slice(),
                )
                .unwrap();
        }

        // Restore the previous position.
        self.seq.seek(SeekFrom::Start(saved_loc as u64)).unwrap();
    }
}

impl Display for InstrSeq {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;

        for (instr, addr) in InstrParser::new(self.seq.get_ref().as_slice()) {
            match instr {
                Instr::AnyByte => {
                    writeln!(f, "{:05x}: ANY_BYTE", addr)?;
                }
                Instr::Byte(byte) => {
                    writeln!(f, "{:05x}: LIT {:#04x}", addr, byte)?;
                }
                Instr::ClassRanges(class) => {
                    write!(f, "{:05x}: CLASS_RANGES", addr)?;
                    for range in class.ranges() {
                        write!(f, " [{:#04x}-{:#04x}]", range.0, range.1)?;
                    }
                    writeln!(f)?;
                }
                Instr::ClassBitmap(class) => {
                    write!(f, "{:05x}: CLASS_BITMAP", addr)?;
                    for byte in class.bytes() {
                        write!(f, " {:#04x}", byte)?;
                    }
                    writeln!(f)?;
                }
                Instr::Jump(offset) => {
                    writeln!(
                        f,
                        "{:05x}: JUMP {:05x}",
                        addr,
                        addr as isize + offset as isize,
                    )?;
                }
                Instr::SplitA(id, offset) => {
                    writeln!(
                        f,
                        "{:05x}: SPLIT_A({}) {:05x}",
                        addr,
                        id,
                        addr as isize + offset as isize,
                    )?;
                }
                Instr::SplitB(id, offset) => {
                    writeln!(
                        f,
                        "{:05x}: SPLIT_B({}) {:05x}",
                        addr,
                        id,
                        addr as isize + offset as isize,
                    )?;
                }
                Instr::SplitN(split) => {
                    write!(f, "{:05x}: SPLIT_N({})", addr, split.id())?;
                    for offset in split.offsets() {
                        write!(f, " {:05x}", addr as isize + offset as isize)?;
                    }
                    writeln!(f)?;
                }
                Instr::Start => {
                    writeln!(f, "{:05x}: START", addr)?;
                }
                Instr::End => {
                    writeln!(f, "{:05x}: END", addr)?;
                }
                Instr::WordBoundary => {
                    writeln!(f, "{:05x}: WORD_BOUNDARY", addr)?;
                }
                Instr::WordBoundaryNeg => {
                    writeln!(f, "{:05x}: WORD_BOUNDARY_NEG", addr)?;
                }
                Instr::Match => {
                    writeln!(f, "{:05x}: MATCH", addr)?;
                    break;
                }
            };
        }

        Ok(())
    }
}
