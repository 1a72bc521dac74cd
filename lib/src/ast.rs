/*!
Abstract syntax tree for regular expression patterns.

The [`Ast`] produced by the parser is consumed by the compiler, which lowers
it into code for the Pike VM. The tree is finite and acyclic and does not
outlive compilation.
*/

use std::fmt::{Debug, Formatter};

/// A node in the abstract syntax tree of a pattern.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum Ast {
    /// Matches the empty string. Produced by empty groups and empty
    /// alternatives, like the first branch in `|a`.
    Empty,
    /// Matches one specific byte.
    Literal(u8),
    /// Matches any byte (`.`).
    Any,
    /// Matches a byte class like `[a-z0-9]` or `[^ab]`. When `negated` is
    /// true the class matches any byte *not* in `set`.
    Class { set: ClassSet, negated: bool },
    /// A zero-width assertion.
    Assertion(AssertionKind),
    /// A sequence of sub-patterns that match one after another.
    Concat(Vec<Ast>),
    /// A set of alternative sub-patterns (`a|b|c`). Earlier alternatives
    /// have higher priority.
    Alternation(Vec<Ast>),
    /// A repeated sub-pattern. `min` is 0 or 1, `max` is `Some(1)` for `?`
    /// and `None` (unbounded) for `*` and `+`.
    Repetition { min: u32, max: Option<u32>, greedy: bool, ast: Box<Ast> },
}

impl Debug for Ast {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Literal(b) => write!(f, "Literal({:#04x})", b),
            Self::Any => write!(f, "Any"),
            Self::Class { set, negated } => {
                if *negated {
                    write!(f, "Class(^{:?})", set)
                } else {
                    write!(f, "Class({:?})", set)
                }
            }
            Self::Assertion(kind) => write!(f, "Assertion({:?})", kind),
            Self::Concat(nodes) => f.debug_tuple("Concat").field(nodes).finish(),
            Self::Alternation(nodes) => {
                f.debug_tuple("Alternation").field(nodes).finish()
            }
            Self::Repetition { min, max, greedy, ast } => f
                .debug_struct("Repetition")
                .field("min", min)
                .field("max", max)
                .field("greedy", greedy)
                .field("ast", ast)
                .finish(),
        }
    }
}

/// Kinds of zero-width assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssertionKind {
    /// `^`, matches at the start of the text.
    StartText,
    /// `$`, matches at the end of the text.
    EndText,
    /// `\b`, matches at a word boundary.
    WordBoundary,
    /// `\B`, matches everywhere except at a word boundary.
    NotWordBoundary,
}

/// An inclusive range of bytes within a [`ClassSet`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ClassRange {
    pub start: u8,
    pub end: u8,
}

impl Debug for ClassRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}-{:#04x}", self.start, self.end)
    }
}

/// A set of bytes represented as a sorted list of non-overlapping,
/// non-adjacent inclusive ranges.
///
/// Ranges can be pushed in any order; [`ClassSet::canonicalize`] must be
/// called once the set is complete, before the ranges are read back. An
/// empty set is valid while building (`[]` is rejected by the parser, not
/// here) and matches nothing.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct ClassSet {
    ranges: Vec<ClassRange>,
    canonical: bool,
}

impl Debug for ClassSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ranges.iter()).finish()
    }
}

impl ClassSet {
    pub fn new() -> Self {
        Self { ranges: Vec::new(), canonical: true }
    }

    /// Adds an inclusive range of bytes to the set.
    pub fn push_range(&mut self, start: u8, end: u8) {
        debug_assert!(start <= end);
        self.ranges.push(ClassRange { start, end });
        self.canonical = false;
    }

    /// Adds a single byte to the set.
    pub fn push_byte(&mut self, byte: u8) {
        self.push_range(byte, byte);
    }

    /// Adds all the ranges in `other` to the set.
    pub fn push_set(&mut self, other: &Self) {
        self.ranges.extend_from_slice(&other.ranges);
        self.canonical = false;
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the ranges in the set.
    ///
    /// The set must have been canonicalized first.
    pub fn ranges(&self) -> &[ClassRange] {
        debug_assert!(self.canonical);
        &self.ranges
    }

    /// Returns the complement of the set: every byte not contained in any
    /// of its ranges.
    ///
    /// The set must have been canonicalized first.
    pub fn complement(&self) -> Self {
        debug_assert!(self.canonical);

        let mut result = Self::new();
        let mut next = Some(0_u8);

        for range in &self.ranges {
            if let Some(start) = next {
                if start < range.start {
                    result.push_range(start, range.start - 1);
                }
            }
            next = range.end.checked_add(1);
        }

        if let Some(start) = next {
            result.push_range(start, u8::MAX);
        }

        result.canonical = true;
        result
    }

    /// Sorts the ranges and merges the ones that overlap or are adjacent.
    pub fn canonicalize(&mut self) {
        if self.canonical {
            return;
        }
        self.ranges.sort_unstable();

        let mut merged: Vec<ClassRange> = Vec::with_capacity(self.ranges.len());

        for range in self.ranges.drain(0..) {
            match merged.last_mut() {
                // The new range overlaps or is adjacent to the previous
                // one, extend the previous range instead of adding a new
                // one. The adjacency check saturates so that ranges ending
                // at 0xFF don't wrap around.
                Some(last) if range.start <= last.end.saturating_add(1) => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }

        self.ranges = merged;
        self.canonical = true;
    }

    /// The digit class `\d`, equivalent to `[0-9]`.
    pub fn digit() -> Self {
        let mut set = Self::new();
        set.push_range(b'0', b'9');
        set.canonicalize();
        set
    }

    /// The word class `\w`, equivalent to `[0-9A-Za-z_]`.
    pub fn word() -> Self {
        let mut set = Self::new();
        set.push_range(b'0', b'9');
        set.push_range(b'A', b'Z');
        set.push_byte(b'_');
        set.push_range(b'a', b'z');
        set.canonicalize();
        set
    }

    /// The whitespace class `\s`, equivalent to `[\t\n\v\f\r ]`.
    pub fn space() -> Self {
        let mut set = Self::new();
        set.push_range(b'\t', b'\r');
        set.push_byte(b' ');
        set.canonicalize();
        set
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassRange, ClassSet};

    #[test]
    fn class_set_canonicalization() {
        let mut set = ClassSet::new();
        set.push_byte(b'z');
        set.push_range(b'a', b'c');
        set.push_range(b'b', b'f');
        set.push_range(b'g', b'h');
        set.canonicalize();

        assert_eq!(
            set.ranges(),
            &[
                ClassRange { start: b'a', end: b'h' },
                ClassRange { start: b'z', end: b'z' },
            ]
        );
    }

    #[test]
    fn class_set_complement() {
        let mut set = ClassSet::new();
        set.push_range(b'a', b'c');
        set.canonicalize();

        assert_eq!(
            set.complement().ranges(),
            &[
                ClassRange { start: 0x00, end: 0x60 },
                ClassRange { start: 0x64, end: 0xff },
            ]
        );

        let mut full = ClassSet::new();
        full.push_range(0x00, 0xff);
        full.canonicalize();
        assert!(full.complement().ranges().is_empty());

        let mut empty = ClassSet::new();
        empty.canonicalize();
        assert_eq!(
            empty.complement().ranges(),
            &[ClassRange { start: 0x00, end: 0xff }]
        );

        let mut upper = ClassSet::new();
        upper.push_range(0x80, 0xff);
        upper.canonicalize();
        assert_eq!(
            upper.complement().ranges(),
            &[ClassRange { start: 0x00, end: 0x7f }]
        );
    }
}
