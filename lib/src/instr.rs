/*!
This module defines the instructions executed by the Pike VM, together with
the types used for encoding and decoding sequences of them.

Instruction encoding format
---------------------------

Compiled patterns consist mostly of instructions that match one specific
byte. The pattern `abc.def`, for example, boils down to:

```text
  match 'a'
  match 'b'
  match 'c'
  match any byte
  match 'd'
  match 'e'
  match 'f'
```

Because "match this byte" is by far the most frequent operation, it gets no
opcode at all: the byte to be matched is stored directly in the instruction
stream, and the stream is therefore mostly a copy of the literal portions of
the pattern. Operations that are not plain byte matches (jumps, splits,
classes, assertions) are introduced by a marker byte, [`OPCODE_PREFIX`],
followed by the opcode and its operands. The marker is `0xAA`, a byte that
is rare in real-life patterns compared to candidates like `0x00` or `0xFF`.

The example above is thus encoded as:

```text
    0x61  0x62  0x63  0xAA     0x05     0x64   0x65  0x66
     a     b     c   marker  any byte    d       e     f
```

Matching a literal `0xAA` is the one special case: it is written twice, so
the sequence `0xAA 0xAA` means "match the byte 0xAA once". Consequently
there is no opcode with the value `0xAA`.
*/

use std::fmt::{Display, Formatter};
use std::mem::size_of;

use bitvec::order::Lsb0;
use bitvec::slice::{BitSlice, IterOnes};

/// Marker that indicates the start of some VM opcode.
pub const OPCODE_PREFIX: u8 = 0xAA;

/// Number of alternatives in an alternation (e.g: `foo|bar|baz` has 3
/// alternatives).
pub type NumAlt = u8;

/// Offset for jump and split instructions. The offset is always relative to
/// the address where the instruction starts.
pub type Offset = i32;

/// Each split instruction in a compiled pattern has a unique ID represented
/// by this type. The ID is used by [`super::pikevm::epsilon_closure`] for
/// tracking which split instructions have been executed while computing a
/// closure. Even though the underlying type is `u16`, only the lower
/// [`SplitId::BITS`] bits are used.
#[derive(Debug, Default, Copy, Clone)]
pub struct SplitId(u16);

impl From<SplitId> for usize {
    fn from(value: SplitId) -> Self {
        value.0 as Self
    }
}

impl Display for SplitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SplitId {
    pub const BITS: usize = 13;

    #[inline]
    pub fn to_le_bytes(self) -> [u8; size_of::<Self>()] {
        self.0.to_le_bytes()
    }

    #[inline]
    pub fn from_le_bytes(bytes: [u8; size_of::<Self>()]) -> Self {
        Self(u16::from_le_bytes(bytes))
    }

    /// Adds a given amount to the split ID, returning [`None`] if the result
    /// exceeds the maximum value representable in [`SplitId::BITS`] bits.
    #[inline]
    pub fn add(self, amount: u16) -> Option<Self> {
        let sum = self.0.checked_add(amount)?;
        if sum >= 1 << Self::BITS {
            return None;
        }
        Some(Self(sum))
    }
}

/// Instructions supported by the Pike VM.
pub enum Instr<'a> {
    /// Match for the whole pattern has been found.
    Match,

    /// Matches any byte.
    AnyByte,

    /// Matches a specific byte.
    Byte(u8),

    /// Matches a byte class. The class is represented by a 256-bit bitmap,
    /// one bit per byte value. If the N-th bit is set, the byte N is part of
    /// the class and should match. This instruction is quite large (2 bytes
    /// of opcode plus 32 bytes of bitmap), so for classes with few ranges
    /// `ClassRanges` is preferred due to its more compact representation.
    ClassBitmap(ClassBitmap<'a>),

    /// Matches a byte class represented as 1 or more byte ranges. The first
    /// `u8` after the opcode indicates the number of ranges, then follows
    /// one `[u8, u8]` pair per range with the starting and ending bytes,
    /// both inclusive. Used while the number of ranges is <= 15; with more
    /// ranges `ClassBitmap` becomes the more compact choice.
    ClassRanges(ClassRanges<'a>),

    /// Creates a new thread that starts at the current instruction pointer
    /// + offset, while the current thread continues at the next instruction.
    /// The name comes from the fact that this instruction splits the
    /// execution flow in two. The newly created thread has lower priority
    /// than the current one, which is what makes the fall-through path the
    /// preferred one.
    SplitA(SplitId, Offset),

    /// Like `SplitA`, but the current thread continues at instruction
    /// pointer + offset while the new thread continues at the next
    /// instruction. The jump target is therefore the preferred path.
    SplitB(SplitId, Offset),

    /// Continues executing the code at N different locations. The current
    /// thread continues at the first location, and N-1 newly created threads
    /// continue at the remaining ones, in decreasing priority order.
    SplitN(SplitN<'a>),

    /// Relative jump. The opcode is followed by an offset; the location of
    /// the target instruction is computed by adding this offset to the
    /// location of the jump opcode.
    Jump(Offset),

    /// Matches the start of the text (`^`). Zero-width.
    Start,

    /// Matches the end of the text (`$`). Zero-width.
    End,

    /// Matches a word boundary, i.e: a position where a word byte
    /// (`[0-9A-Za-z_]`) meets a non-word byte or the edge of the text.
    /// Used for `\b`. Zero-width.
    WordBoundary,

    /// The negation of `WordBoundary`. Used for `\B`. Zero-width.
    WordBoundaryNeg,
}

impl<'a> Instr<'a> {
    pub const MATCH: u8 = 0x00;
    pub const SPLIT_A: u8 = 0x01;
    pub const SPLIT_B: u8 = 0x02;
    pub const SPLIT_N: u8 = 0x03;
    pub const JUMP: u8 = 0x04;
    pub const ANY_BYTE: u8 = 0x05;
    pub const CLASS_BITMAP: u8 = 0x06;
    pub const CLASS_RANGES: u8 = 0x07;
    pub const START: u8 = 0x08;
    pub const END: u8 = 0x09;
    pub const WORD_BOUNDARY: u8 = 0x0A;
    pub const WORD_BOUNDARY_NEG: u8 = 0x0B;
}

/// Parses a slice of bytes that contains Pike VM instructions, returning
/// individual instructions and their arguments.
pub(crate) struct InstrParser<'a> {
    code: &'a [u8],
    addr: usize,
}

impl<'a> InstrParser<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, addr: 0 }
    }

    /// Decodes the instruction that starts at the beginning of `code`,
    /// returning the instruction and its size in bytes.
    #[inline(always)]
    pub fn decode_instr(code: &[u8]) -> (Instr, usize) {
        match code[..] {
            [OPCODE_PREFIX, Instr::ANY_BYTE, ..] => (Instr::AnyByte, 2),
            [OPCODE_PREFIX, Instr::JUMP, ..] => {
                let offset = Self::decode_offset(&code[2..]);

                (Instr::Jump(offset), 2 + size_of::<Offset>())
            }
            [OPCODE_PREFIX, Instr::SPLIT_A, ..] => {
                let id = Self::decode_split_id(&code[2..]);
                let offset =
                    Self::decode_offset(&code[2 + size_of::<SplitId>()..]);

                (
                    Instr::SplitA(id, offset),
                    2 + size_of::<SplitId>() + size_of::<Offset>(),
                )
            }
            [OPCODE_PREFIX, Instr::SPLIT_B, ..] => {
                let id = Self::decode_split_id(&code[2..]);
                let offset =
                    Self::decode_offset(&code[2 + size_of::<SplitId>()..]);

                (
                    Instr::SplitB(id, offset),
                    2 + size_of::<SplitId>() + size_of::<Offset>(),
                )
            }
            [OPCODE_PREFIX, Instr::SPLIT_N, ..] => {
                let id = Self::decode_split_id(&code[2..]);
                let n =
                    Self::decode_num_alt(&code[2 + size_of::<SplitId>()..]);

                let offsets =
                    &code[2 + size_of::<SplitId>() + size_of::<NumAlt>()
                        ..2 + size_of::<SplitId>()
                            + size_of::<NumAlt>()
                            + size_of::<Offset>() * n as usize];

                (
                    Instr::SplitN(SplitN(id, offsets)),
                    2 + size_of::<SplitId>()
                        + size_of::<NumAlt>()
                        + size_of::<Offset>() * n as usize,
                )
            }
            [OPCODE_PREFIX, Instr::CLASS_RANGES, n, ..] => {
                let ranges = &code[3..3 + size_of::<[u8; 2]>() * n as usize];

                (
                    Instr::ClassRanges(ClassRanges(ranges)),
                    3 + size_of::<[u8; 2]>() * n as usize,
                )
            }
            [OPCODE_PREFIX, Instr::CLASS_BITMAP, ..] => {
                let bitmap = &code[2..2 + 32];
                (Instr::ClassBitmap(ClassBitmap(bitmap)), 2 + bitmap.len())
            }
            [OPCODE_PREFIX, Instr::START, ..] => (Instr::Start, 2),
            [OPCODE_PREFIX, Instr::END, ..] => (Instr::End, 2),
            [OPCODE_PREFIX, Instr::WORD_BOUNDARY, ..] => {
                (Instr::WordBoundary, 2)
            }
            [OPCODE_PREFIX, Instr::WORD_BOUNDARY_NEG, ..] => {
                (Instr::WordBoundaryNeg, 2)
            }
            [OPCODE_PREFIX, Instr::MATCH, ..] => (Instr::Match, 2),
            [OPCODE_PREFIX, OPCODE_PREFIX, ..] => {
                (Instr::Byte(OPCODE_PREFIX), 2)
            }
            [b, ..] => (Instr::Byte(b), 1),
            _ => unreachable!(),
        }
    }

    fn decode_offset(slice: &[u8]) -> Offset {
        let bytes: [u8; size_of::<Offset>()] =
            slice[..size_of::<Offset>()].try_into().unwrap();

        Offset::from_le_bytes(bytes)
    }

    fn decode_num_alt(slice: &[u8]) -> NumAlt {
        let bytes: [u8; size_of::<NumAlt>()] =
            slice[..size_of::<NumAlt>()].try_into().unwrap();

        NumAlt::from_le_bytes(bytes)
    }

    fn decode_split_id(slice: &[u8]) -> SplitId {
        let bytes: [u8; size_of::<SplitId>()] =
            slice[..size_of::<SplitId>()].try_into().unwrap();

        SplitId::from_le_bytes(bytes)
    }
}

impl<'a> Iterator for InstrParser<'a> {
    type Item = (Instr<'a>, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.code.is_empty() {
            return None;
        }
        let (instr, size) = InstrParser::decode_instr(self.code);
        let addr = self.addr;
        self.addr += size;
        self.code = &self.code[size..];
        Some((instr, addr))
    }
}

/// Operands of a [`Instr::SplitN`] instruction: the split ID and the raw
/// bytes that encode the target offsets.
pub struct SplitN<'a>(SplitId, &'a [u8]);

impl<'a> SplitN<'a> {
    #[inline]
    pub fn id(&self) -> SplitId {
        self.0
    }

    #[inline]
    pub fn offsets(&self) -> SplitOffsets<'a> {
        SplitOffsets(self.1)
    }
}

/// Iterates over the target offsets of a [`Instr::SplitN`] instruction.
pub struct SplitOffsets<'a>(&'a [u8]);

impl<'a> Iterator for SplitOffsets<'a> {
    type Item = Offset;

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.len() < size_of::<Offset>() {
            return None;
        }
        let next = Offset::from_le_bytes(
            (&self.0[..size_of::<Offset>()]).try_into().unwrap(),
        );
        self.0 = &self.0[size_of::<Offset>()..];
        Some(next)
    }
}

impl<'a> DoubleEndedIterator for SplitOffsets<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let len = self.0.len();
        if len < size_of::<Offset>() {
            return None;
        }
        let next = Offset::from_le_bytes(
            (&self.0[len - size_of::<Offset>()..len]).try_into().unwrap(),
        );
        self.0 = &self.0[..len - size_of::<Offset>()];
        Some(next)
    }
}

/// Operand of a [`Instr::ClassRanges`] instruction: the raw bytes that
/// encode the ranges in the class.
pub struct ClassRanges<'a>(&'a [u8]);

impl<'a> ClassRanges<'a> {
    /// Returns an iterator over the ranges of bytes contained in the class.
    pub fn ranges(&self) -> Ranges<'a> {
        Ranges(self.0)
    }

    /// Returns true if the class contains the given byte.
    pub fn contains(&self, byte: u8) -> bool {
        for range in self.ranges() {
            if (range.0..=range.1).contains(&byte) {
                return true;
            }
        }
        false
    }
}

/// Iterates over the (start, end) pairs of a [`Instr::ClassRanges`]
/// instruction.
pub struct Ranges<'a>(&'a [u8]);

impl<'a> Iterator for Ranges<'a> {
    type Item = (u8, u8);

    fn next(&mut self) -> Option<Self::Item> {
        if self.0.len() < 2 {
            return None;
        }
        let start = self.0[0];
        let end = self.0[1];
        self.0 = &self.0[2..];
        Some((start, end))
    }
}

/// Operand of a [`Instr::ClassBitmap`] instruction: a 256-bit bitmap with
/// one bit per byte value.
pub struct ClassBitmap<'a>(&'a [u8]);

impl<'a> ClassBitmap<'a> {
    /// Returns an iterator over the bytes contained in the class.
    pub fn bytes(&self) -> IterOnes<'a, u8, Lsb0> {
        BitSlice::<_, Lsb0>::from_slice(self.0).iter_ones()
    }

    /// Returns true if the class contains the given byte.
    pub fn contains(&self, byte: u8) -> bool {
        BitSlice::<_, Lsb0>::from_slice(self.0)[byte as usize]
    }
}
