/*!
This module provides the engine facade: compiled patterns and the search
operations over them.

A [`Regexp`] owns the code produced by the compiler for one pattern.
Compilation happens once; the compiled pattern can then be used for any
number of searches, and shared freely between threads, as every search
allocates its own transient VM state.
*/

use std::fmt::{Debug, Formatter};

use log::*;
use thiserror::Error;

use crate::compiler;
use crate::compiler::Compiler;
use crate::parser;
use crate::parser::ParseError;
use crate::pikevm::{Action, PikeVM};

/// Errors returned by the engine.
///
/// A failed search is not an error: searches that don't find a match
/// return `Ok(None)` or an empty vector. The error cases are malformed
/// patterns, patterns that exceed the limits of the VM, and invalid
/// arguments.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The pattern is not syntactically valid.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The pattern compiles to more code than the VM can address.
    #[error("regexp too large")]
    TooLarge,

    /// Some alternation in the pattern has too many alternatives.
    #[error("too many alternatives in alternation (max: 255)")]
    TooManyAlternatives,

    /// The `start` offset passed to a search is beyond the end of the
    /// text.
    #[error("start offset {start} is beyond the end of the text ({len} bytes)")]
    StartOutOfBounds {
        /// The offending offset.
        start: usize,
        /// The length of the text.
        len: usize,
    },

    /// [`Regexp::find_all`] was called with `max_matches` equal to zero.
    #[error("max_matches must be greater than zero")]
    ZeroMaxMatches,
}

impl From<compiler::Error> for Error {
    fn from(err: compiler::Error) -> Self {
        match err {
            compiler::Error::TooLarge => Self::TooLarge,
            compiler::Error::TooManyAlternatives => Self::TooManyAlternatives,
        }
    }
}

/// A match found by a search operation.
///
/// Both fields are byte offsets relative to the text passed to the call
/// that produced the match, not to the offset the search started at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Offset within the text where the match starts.
    pub position: usize,
    /// Length of the match, in bytes. Can be zero, as some patterns match
    /// the empty string.
    pub length: usize,
}

/// A compiled regular expression.
///
/// Produced by [`Regexp::new`] (or the [`compile`] shorthand), and
/// immutable from then on. Matching follows leftmost-first semantics, like
/// conventional backtracking engines: among the matches that start at the
/// leftmost possible position, earlier alternatives win over later ones
/// and greedy repetitions prefer more iterations, regardless of the
/// overall match length.
///
/// ```
/// use pike_regexp::Regexp;
///
/// let re = Regexp::new("ab+c").unwrap();
/// let m = re.match_at(b"abbbc", 0).unwrap().unwrap();
///
/// assert_eq!(m.position, 0);
/// assert_eq!(m.length, 5);
/// ```
pub struct Regexp {
    /// Code for the Pike VM.
    code: Vec<u8>,
    /// The pattern the code was compiled from. Retained for diagnostics
    /// and equality checks, never re-parsed.
    pattern: String,
}

impl Regexp {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let ast = parser::parse(pattern)?;
        let code = Compiler::new().compile(&ast)?.into_inner();

        debug!(
            "pattern `{}` compiled to {} bytes of VM code",
            pattern,
            code.len()
        );

        Ok(Self { code, pattern: pattern.to_owned() })
    }

    /// Returns the pattern this regexp was compiled from.
    #[inline]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Finds the match that starts exactly at the `start` offset of
    /// `text`.
    ///
    /// The search is anchored: a pattern that matches somewhere after
    /// `start` but not at `start` itself produces `Ok(None)`. `start` can
    /// be equal to the text length (patterns like `a*` or `$` match the
    /// empty string there); beyond that the call fails with
    /// [`Error::StartOutOfBounds`].
    pub fn match_at(
        &self,
        text: &[u8],
        start: usize,
    ) -> Result<Option<Match>, Error> {
        if start > text.len() {
            return Err(Error::StartOutOfBounds { start, len: text.len() });
        }
        Ok(self.match_anchored(text, start))
    }

    /// Finds every non-overlapping match in `text`, left to right.
    ///
    /// At most `max_matches` matches are returned; passing zero is an
    /// error, not a request for an unbounded search. The search advances
    /// past the end of each match, plus one extra byte when the match was
    /// empty, so it always makes forward progress and terminates.
    pub fn find_all(
        &self,
        text: &[u8],
        max_matches: usize,
    ) -> Result<Vec<Match>, Error> {
        if max_matches == 0 {
            return Err(Error::ZeroMaxMatches);
        }

        let mut matches = Vec::new();
        let mut start = 0;

        while matches.len() < max_matches {
            let m = match self.find_from(text, start) {
                Some(m) => m,
                None => break,
            };
            start = if m.length == 0 {
                m.position + 1
            } else {
                m.position + m.length
            };
            matches.push(m);
        }

        Ok(matches)
    }

    /// Finds the leftmost match that starts at `start` or later.
    ///
    /// Implemented by retrying the anchored search at successive offsets,
    /// which keeps the position bookkeeping exact.
    fn find_from(&self, text: &[u8], start: usize) -> Option<Match> {
        (start..=text.len())
            .find_map(|offset| self.match_anchored(text, offset))
    }

    /// Anchored search with `start` already validated.
    fn match_anchored(&self, text: &[u8], start: usize) -> Option<Match> {
        let mut length = None;

        // Each reported match is longer than the previous one, and
        // `Action::Stop` discards the lower-priority threads, so the last
        // reported length is the leftmost-first match.
        PikeVM::new(self.code.as_slice()).try_match(text, start, |len| {
            length = Some(len);
            Action::Stop
        });

        length.map(|length| Match { position: start, length })
    }
}

impl Debug for Regexp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Regexp({})", self.pattern)
    }
}

impl PartialEq for Regexp {
    /// Two compiled patterns are equal when they were compiled from the
    /// same pattern string.
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for Regexp {}

/// Compiles a pattern. Shorthand for [`Regexp::new`].
#[inline]
pub fn compile(pattern: &str) -> Result<Regexp, Error> {
    Regexp::new(pattern)
}

/// Compiles `pattern` and finds the match that starts at the `start`
/// offset of `text`.
///
/// The compiled pattern is discarded afterwards, which makes this function
/// convenient for one-shot searches but wasteful for repeated ones:
/// callers that match the same pattern more than once should compile it
/// once with [`compile`] and keep the [`Regexp`] around.
pub fn match_string(
    pattern: &str,
    text: &[u8],
    start: usize,
) -> Result<Option<Match>, Error> {
    compile(pattern)?.match_at(text, start)
}

/// Returns the engine version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
