/*! An in-process regular expression engine.

Patterns are compiled into a compact byte-code program using [Thompson's
construction][1], and the program is executed by a [Pike VM][2] that
advances every viable path through the pattern in lockstep over the input.
There is no backtracking: matching time is O(pattern size × text length)
for every pattern, including the pathological ones that make backtracking
engines take exponential time.

The main type in this crate is [`Regexp`], a compiled pattern. Compiling
is done once with [`Regexp::new`] (or the [`compile`] shorthand); the
resulting value is immutable and can be shared across threads, with each
search allocating its own transient state.

The engine works on bytes: positions and lengths are byte offsets, and a
non-ASCII literal in a pattern matches its UTF-8 byte sequence. Matching
follows leftmost-first (Perl-style) semantics: earlier alternatives and
greedy repetitions win, not the longest overall match.

# Example

```rust
use pike_regexp::Regexp;

// Compile a pattern.
let re = Regexp::new(r"\d+").unwrap();

// Find the first match in some text.
let m = re.find_all(b"order 66, aisle 3", 1).unwrap()[0];
assert_eq!((m.position, m.length), (6, 2));

// Or every match.
let all = re.find_all(b"order 66, aisle 3", 10).unwrap();
assert_eq!(all.len(), 2);
```

[1]: https://en.wikipedia.org/wiki/Thompson%27s_construction
[2]: https://swtch.com/~rsc/regexp/regexp2.html
*/

#![deny(missing_docs)]

pub use parser::ParseError;
pub use parser::ParseErrorKind;

pub use regexp::compile;
pub use regexp::match_string;
pub use regexp::version;
pub use regexp::Error;
pub use regexp::Match;
pub use regexp::Regexp;

mod ast;
mod bitmapset;
mod compiler;
mod instr;
mod parser;
mod pikevm;
mod regexp;

#[cfg(test)]
mod tests;
