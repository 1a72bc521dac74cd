/*!
This module implements a [Pike VM][1] that executes the code produced by
the [compiler][`crate::compiler::Compiler`].

The VM is a Thompson-style NFA simulation: instead of trying one path
through the pattern at a time and backtracking on failure, it advances a
set of threads in lockstep over the input, one thread per instruction that
is currently able to consume the next byte. The thread set is deduplicated
by instruction address, so its size never exceeds the code size and the
total work is bounded by O(code size × input length), regardless of how
pathological the pattern is.

[1]: https://swtch.com/~rsc/regexp/regexp2.html
*/

use std::mem;

use bitvec::array::BitArray;

use crate::bitmapset::BitmapSet;
use crate::instr::{Instr, InstrParser, Offset, SplitId};

/// Value returned by the callback passed to [`PikeVM::try_match`] for
/// indicating whether the VM should keep looking for more matches or stop.
pub(crate) enum Action {
    Continue,
    Stop,
}

/// A Pike VM over some compiled pattern code.
pub(crate) struct PikeVM<'r> {
    /// The code for the VM. Produced by the compiler.
    code: &'r [u8],
    /// The set of currently active threads. Each item in this set is a
    /// position within the VM code, pointing to some VM instruction. Items
    /// are unique; there are never two active threads at the same VM
    /// instruction.
    threads: BitmapSet,
    /// The set of threads that will become the active threads when the
    /// next byte is read from the input.
    next_threads: BitmapSet,
    /// State for the [`epsilon_closure`] function.
    cache: EpsilonClosureState,
}

impl<'r> PikeVM<'r> {
    /// Creates a new [`PikeVM`].
    pub fn new(code: &'r [u8]) -> Self {
        Self {
            code,
            threads: BitmapSet::new(),
            next_threads: BitmapSet::new(),
            cache: EpsilonClosureState::new(),
        }
    }

    /// Executes the VM code over `text`, anchored at the `start` offset,
    /// and calls `f` for each match found. `f` receives the number of
    /// bytes that matched, which can be zero, as some patterns match the
    /// empty string.
    ///
    /// Matches are reported in thread-priority order: when several threads
    /// reach the match instruction at the same input position, the one
    /// whose path through the pattern has the highest priority reports
    /// first.
    ///
    /// The `f` function must return either [`Action::Continue`] or
    /// [`Action::Stop`]. `Action::Continue` keeps running every thread,
    /// which eventually reports every possible match length.
    /// [`Action::Stop`] discards the threads with lower priority than the
    /// reporting one, while threads with higher priority keep running and
    /// may report a longer match later; the last reported match is
    /// therefore the leftmost-first one.
    pub(crate) fn try_match(
        &mut self,
        text: &[u8],
        start: usize,
        mut f: impl FnMut(usize) -> Action,
    ) {
        debug_assert!(start <= text.len());
        debug_assert!(self.threads.is_empty());

        let mut fwd_input = text[start..].iter();
        let mut curr_byte = fwd_input.next().copied();

        // The byte right before the starting point, if any. Zero-width
        // assertions look at it for deciding whether they match at the
        // current position.
        let prev_byte = if start > 0 { Some(text[start - 1]) } else { None };

        let mut current_pos = 0;

        epsilon_closure(
            self.code,
            0,
            curr_byte,
            prev_byte,
            &mut self.cache,
            &mut self.threads,
        );

        while !self.threads.is_empty() {
            let next_byte = fwd_input.next().copied();

            for ip in self.threads.iter() {
                let (instr, instr_size) =
                    InstrParser::decode_instr(&self.code[*ip..]);

                let is_match = match instr {
                    Instr::AnyByte => curr_byte.is_some(),
                    Instr::Byte(byte) => curr_byte == Some(byte),
                    Instr::ClassBitmap(class) => {
                        matches!(curr_byte, Some(b) if class.contains(b))
                    }
                    Instr::ClassRanges(class) => {
                        matches!(curr_byte, Some(b) if class.contains(b))
                    }
                    Instr::Match => match f(current_pos) {
                        Action::Stop => break,
                        Action::Continue => false,
                    },
                    // Jumps, splits and assertions never appear in the
                    // active set, the epsilon closure resolves them.
                    _ => unreachable!(),
                };

                if is_match {
                    epsilon_closure(
                        self.code,
                        *ip + instr_size,
                        next_byte,
                        curr_byte,
                        &mut self.cache,
                        &mut self.next_threads,
                    );
                }
            }

            curr_byte = next_byte;
            current_pos += 1;

            mem::swap(&mut self.threads, &mut self.next_threads);
            self.next_threads.clear();
        }
    }
}

/// Structure used by the [`epsilon_closure`] function for maintaining its
/// state during the computation of an epsilon closure. See the
/// documentation of [`epsilon_closure`] for details.
pub(crate) struct EpsilonClosureState {
    /// Instruction pointers pending to be explored.
    threads: Vec<usize>,
    /// This bit array has one bit per possible value of [`SplitId`]. If
    /// the split instruction with ID = N is executed, the N-th bit in the
    /// array is set to 1.
    executed_splits: BitArray<[u64; (1 << SplitId::BITS) / 64]>,
    /// Indicates whether the `executed_splits` bit array needs to be
    /// cleared during the next call to [`EpsilonClosureState::executed`].
    dirty: bool,
}

impl EpsilonClosureState {
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            executed_splits: Default::default(),
            dirty: false,
        }
    }

    #[inline(always)]
    pub fn executed(&mut self, split_id: SplitId) -> bool {
        if self.dirty {
            self.executed_splits.fill(false);
            self.dirty = false;
        }
        let index: usize = split_id.into();
        let executed = self.executed_splits[index];
        if !executed {
            self.executed_splits.set(index, true);
        }
        executed
    }
}

/// Computes the epsilon closure derived from executing the code starting
/// at a given position.
///
/// In a NFA, the epsilon closure of some state `S` is the set containing
/// all the states that can be reached from `S` by following epsilon
/// transitions (i.e: transitions that don't consume any input symbol). The
/// Pike VM code produced for a pattern is simply another way of
/// representing a NFA where each instruction is a state. The NFA jumps
/// from one state to another by following the instruction flow.
/// Instructions like `jump` and `split`, which jump from one state to
/// another (or others) unconditionally, without consuming a byte from the
/// input, are epsilon transitions in this context. Zero-width assertions
/// are conditional epsilon transitions: they are followed only when the
/// bytes around the current position satisfy the assertion.
///
/// This function starts at the instruction in the `start` location, and
/// from there explores all the possible transitions that don't depend on
/// the next value from the input. When some instruction that depends on
/// the next input is found (a non-epsilon transition) the location of that
/// instruction is added to the closure. The closure keeps the order in
/// which the locations were reached, which is what makes earlier (higher
/// priority) paths through the pattern win over later ones.
///
/// Each split instruction is followed at most once per closure, which
/// guarantees that the computation terminates even when the code contains
/// loops whose body can match the empty string, like the ones produced for
/// `(a?)*`.
///
/// This function expects a mutable reference to a [`EpsilonClosureState`],
/// which is the structure used for keeping track of the current state
/// while computing the epsilon closure. Instead of creating a new instance
/// of [`EpsilonClosureState`] on each call to [`epsilon_closure`], the
/// same instance should be reused in order to prevent unnecessary
/// allocations. The function guarantees that the state is empty before
/// returning, and therefore it can be re-used safely.
#[inline(always)]
pub(crate) fn epsilon_closure(
    code: &[u8],
    start: usize,
    curr_byte: Option<u8>,
    prev_byte: Option<u8>,
    state: &mut EpsilonClosureState,
    closure: &mut BitmapSet,
) {
    state.threads.push(start);
    state.dirty = true;

    let is_word_char = |c: u8| c == b'_' || c.is_ascii_alphanumeric();

    let apply_offset = |ip: usize, offset: Offset| -> usize {
        (ip as isize).saturating_add(offset as isize).try_into().unwrap()
    };

    while let Some(ip) = state.threads.pop() {
        let (instr, instr_size) = InstrParser::decode_instr(&code[ip..]);
        match instr {
            Instr::AnyByte
            | Instr::Byte(_)
            | Instr::ClassBitmap(_)
            | Instr::ClassRanges(_)
            | Instr::Match => {
                closure.insert(ip);
            }
            Instr::SplitA(id, offset) => {
                if !state.executed(id) {
                    state.threads.push(apply_offset(ip, offset));
                    state.threads.push(ip + instr_size);
                }
            }
            Instr::SplitB(id, offset) => {
                if !state.executed(id) {
                    state.threads.push(ip + instr_size);
                    state.threads.push(apply_offset(ip, offset));
                }
            }
            Instr::SplitN(split) => {
                if !state.executed(split.id()) {
                    for offset in split.offsets().rev() {
                        state.threads.push(apply_offset(ip, offset));
                    }
                }
            }
            Instr::Jump(offset) => {
                state.threads.push(apply_offset(ip, offset));
            }
            Instr::Start => {
                if prev_byte.is_none() {
                    state.threads.push(ip + instr_size);
                }
            }
            Instr::End => {
                if curr_byte.is_none() {
                    state.threads.push(ip + instr_size);
                }
            }
            Instr::WordBoundary | Instr::WordBoundaryNeg => {
                let mut is_match = match (prev_byte, curr_byte) {
                    (Some(p), Some(c)) => is_word_char(p) != is_word_char(c),
                    (None, Some(b)) | (Some(b), None) => is_word_char(b),
                    _ => false,
                };

                if matches!(instr, Instr::WordBoundaryNeg) {
                    is_match = !is_match;
                }

                if is_match {
                    state.threads.push(ip + instr_size);
                }
            }
        }
    }
}
