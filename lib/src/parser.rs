/*!
This module parses regular expression patterns into their abstract syntax
tree representation.

The parser is a hand-written recursive-descent parser that performs a single
left-to-right pass over the pattern with one byte of lookahead. It never
backtracks over already consumed input; exploring multiple possibilities is
the matcher's job, not the parser's.

The grammar, from lowest to highest precedence:

```text
  alternation   := concat ('|' concat)*
  concat        := repetition*
  repetition    := atom ('*' | '+' | '?') '?'?
  atom          := literal | '.' | class | group | assertion | escape
  class         := '[' '^'? class-item+ ']'
  group         := '(' alternation ')'
  assertion     := '^' | '$' | '\b' | '\B'
```

Patterns are processed as bytes. A non-ASCII literal in the pattern simply
contributes its UTF-8 bytes, which then match the same byte sequence in the
scanned text. Inside character classes non-ASCII characters are rejected,
as a range between multi-byte characters has no byte-level meaning.
*/

use thiserror::Error;

use crate::ast::{AssertionKind, Ast, ClassSet};

/// Error returned when a pattern is not syntactically valid.
///
/// The error carries the byte index of the offending character within the
/// pattern, and the kind of syntax error found at that position.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error at position {position}: {kind}")]
pub struct ParseError {
    /// Byte index of the offending character within the pattern.
    pub position: usize,
    /// The kind of syntax error.
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(position: usize, kind: ParseErrorKind) -> Self {
        Self { position, kind }
    }
}

/// Kinds of syntax errors found while parsing a pattern.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The pattern is empty.
    #[error("empty pattern")]
    EmptyPattern,

    /// A repetition operator (`*`, `+` or `?`) has no atom to repeat, like
    /// in `*a` or `a**`.
    #[error("repetition operator with nothing to repeat")]
    NothingToRepeat,

    /// A `(` without its matching `)`, or the other way around.
    #[error("unbalanced parenthesis")]
    UnbalancedParen,

    /// A `]` that doesn't close any character class.
    #[error("unbalanced bracket")]
    UnbalancedBracket,

    /// A character class missing its closing `]`.
    #[error("unclosed character class")]
    UnclosedClass,

    /// A character class that contains no characters (`[]` or `[^]`).
    #[error("empty character class")]
    EmptyClass,

    /// A range like `z-a` whose start is greater than its end, or a range
    /// with a multi-character class as one of its ends.
    #[error("invalid range in character class")]
    InvalidClassRange,

    /// A non-ASCII character inside a character class.
    #[error("non-ASCII character in character class")]
    NonAsciiClass,

    /// A `\` at the very end of the pattern.
    #[error("trailing backslash")]
    TrailingBackslash,

    /// An escape sequence with no assigned meaning, like `\q`.
    #[error("invalid escape sequence")]
    InvalidEscape,
}

/// Parses a pattern, returning its AST.
pub(crate) fn parse(pattern: &str) -> Result<Ast, ParseError> {
    Parser::new(pattern).parse()
}

struct Parser<'a> {
    pattern: &'a [u8],
    pos: usize,
}

/// A single item inside a character class: either one byte (a literal or a
/// single-byte escape) or a multi-byte set (`\d`, `\w`, ...). Only the
/// former can be the endpoint of a range.
enum ClassItem {
    Byte(u8),
    Set(ClassSet),
}

impl<'a> Parser<'a> {
    fn new(pattern: &'a str) -> Self {
        Self { pattern: pattern.as_bytes(), pos: 0 }
    }

    fn parse(mut self) -> Result<Ast, ParseError> {
        if self.pattern.is_empty() {
            return Err(ParseError::new(0, ParseErrorKind::EmptyPattern));
        }

        let ast = self.parse_alternation()?;

        // `parse_alternation` consumes the whole pattern, except when it
        // finds a `)` that doesn't close any group.
        if self.peek().is_some() {
            return Err(ParseError::new(
                self.pos,
                ParseErrorKind::UnbalancedParen,
            ));
        }

        Ok(ast)
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.pattern.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, n: usize) -> Option<u8> {
        self.pattern.get(self.pos + n).copied()
    }

    #[inline]
    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn parse_alternation(&mut self) -> Result<Ast, ParseError> {
        let mut alternatives = vec![self.parse_concat()?];

        while self.peek() == Some(b'|') {
            self.bump();
            alternatives.push(self.parse_concat()?);
        }

        if alternatives.len() == 1 {
            Ok(alternatives.remove(0))
        } else {
            Ok(Ast::Alternation(alternatives))
        }
    }

    fn parse_concat(&mut self) -> Result<Ast, ParseError> {
        let mut nodes = Vec::new();

        while let Some(byte) = self.peek() {
            if byte == b'|' || byte == b')' {
                break;
            }
            nodes.push(self.parse_repetition()?);
        }

        match nodes.len() {
            0 => Ok(Ast::Empty),
            1 => Ok(nodes.remove(0)),
            _ => Ok(Ast::Concat(nodes)),
        }
    }

    fn parse_repetition(&mut self) -> Result<Ast, ParseError> {
        let mut ast = self.parse_atom()?;
        let mut repeated = false;

        while let Some(op) = self.peek() {
            let (min, max) = match op {
                b'*' => (0, None),
                b'+' => (1, None),
                b'?' => (0, Some(1)),
                _ => break,
            };
            // Nested quantifiers like `a**` are rejected; `a*?` is not
            // nesting, the `?` makes the `*` lazy.
            if repeated {
                return Err(ParseError::new(
                    self.pos,
                    ParseErrorKind::NothingToRepeat,
                ));
            }
            self.bump();
            let greedy = if self.peek() == Some(b'?') {
                self.bump();
                false
            } else {
                true
            };
            ast = Ast::Repetition { min, max, greedy, ast: Box::new(ast) };
            repeated = true;
        }

        Ok(ast)
    }

    fn parse_atom(&mut self) -> Result<Ast, ParseError> {
        let start = self.pos;

        match self.bump() {
            Some(b'(') => {
                let ast = self.parse_alternation()?;
                if self.bump() != Some(b')') {
                    return Err(ParseError::new(
                        start,
                        ParseErrorKind::UnbalancedParen,
                    ));
                }
                Ok(ast)
            }
            Some(b'[') => self.parse_class(start),
            Some(b'.') => Ok(Ast::Any),
            Some(b'^') => Ok(Ast::Assertion(AssertionKind::StartText)),
            Some(b'$') => Ok(Ast::Assertion(AssertionKind::EndText)),
            Some(b'\\') => self.parse_escape(start),
            Some(b'*') | Some(b'+') | Some(b'?') => Err(ParseError::new(
                start,
                ParseErrorKind::NothingToRepeat,
            )),
            Some(b']') => Err(ParseError::new(
                start,
                ParseErrorKind::UnbalancedBracket,
            )),
            Some(byte) => Ok(Ast::Literal(byte)),
            // `parse_concat` guarantees that there's at least one byte.
            None => unreachable!(),
        }
    }

    /// Parses an escape sequence outside a character class. `start` is the
    /// position of the backslash, which has already been consumed.
    fn parse_escape(&mut self, start: usize) -> Result<Ast, ParseError> {
        let class = |set: ClassSet, negated| Ast::Class { set, negated };

        match self.bump() {
            None => Err(ParseError::new(
                start,
                ParseErrorKind::TrailingBackslash,
            )),
            Some(b'd') => Ok(class(ClassSet::digit(), false)),
            Some(b'D') => Ok(class(ClassSet::digit(), true)),
            Some(b'w') => Ok(class(ClassSet::word(), false)),
            Some(b'W') => Ok(class(ClassSet::word(), true)),
            Some(b's') => Ok(class(ClassSet::space(), false)),
            Some(b'S') => Ok(class(ClassSet::space(), true)),
            Some(b'b') => Ok(Ast::Assertion(AssertionKind::WordBoundary)),
            Some(b'B') => Ok(Ast::Assertion(AssertionKind::NotWordBoundary)),
            Some(byte) => self.escape_byte(start, byte).map(Ast::Literal),
        }
    }

    /// Resolves an escape sequence that stands for a single byte. `start`
    /// is the position of the backslash; `byte` the character that follows
    /// it, already consumed.
    fn escape_byte(
        &mut self,
        start: usize,
        byte: u8,
    ) -> Result<u8, ParseError> {
        match byte {
            b'n' => Ok(b'\n'),
            b'r' => Ok(b'\r'),
            b't' => Ok(b'\t'),
            b'f' => Ok(0x0C),
            b'v' => Ok(0x0B),
            b'a' => Ok(0x07),
            b'0' => Ok(0x00),
            b'x' => {
                let hex = |b: Option<u8>| {
                    char::from(b?).to_digit(16).map(|d| d as u8)
                };
                match (hex(self.bump()), hex(self.bump())) {
                    (Some(hi), Some(lo)) => Ok(hi * 16 + lo),
                    _ => Err(ParseError::new(
                        start,
                        ParseErrorKind::InvalidEscape,
                    )),
                }
            }
            // Escaped ASCII alphanumerics with no assigned meaning are
            // rejected instead of being silently turned into literals,
            // so that `\q` can get a meaning in the future without
            // changing the behavior of existing patterns.
            byte if byte.is_ascii_alphanumeric() => Err(ParseError::new(
                start,
                ParseErrorKind::InvalidEscape,
            )),
            byte => Ok(byte),
        }
    }

    /// Parses a character class. `start` is the position of the opening
    /// bracket, which has already been consumed.
    fn parse_class(&mut self, start: usize) -> Result<Ast, ParseError> {
        let negated = if self.peek() == Some(b'^') {
            self.bump();
            true
        } else {
            false
        };

        let mut set = ClassSet::new();

        loop {
            let item_pos = self.pos;
            let byte = match self.bump() {
                None => {
                    return Err(ParseError::new(
                        start,
                        ParseErrorKind::UnclosedClass,
                    ))
                }
                Some(b']') => {
                    if set.is_empty() {
                        return Err(ParseError::new(
                            start,
                            ParseErrorKind::EmptyClass,
                        ));
                    }
                    break;
                }
                Some(byte) => byte,
            };

            match self.parse_class_item(item_pos, byte)? {
                ClassItem::Set(other) => set.push_set(&other),
                ClassItem::Byte(lo) => {
                    // A `-` forms a range unless it is the last character
                    // before the closing bracket, as in `[a-]`.
                    if self.peek() == Some(b'-')
                        && !matches!(self.peek_at(1), Some(b']') | None)
                    {
                        self.bump();
                        let hi_pos = self.pos;
                        let hi_byte = match self.bump() {
                            Some(byte) => byte,
                            None => {
                                return Err(ParseError::new(
                                    start,
                                    ParseErrorKind::UnclosedClass,
                                ))
                            }
                        };
                        match self.parse_class_item(hi_pos, hi_byte)? {
                            ClassItem::Byte(hi) if lo <= hi => {
                                set.push_range(lo, hi);
                            }
                            _ => {
                                return Err(ParseError::new(
                                    item_pos,
                                    ParseErrorKind::InvalidClassRange,
                                ))
                            }
                        }
                    } else {
                        set.push_byte(lo);
                    }
                }
            }
        }

        set.canonicalize();

        Ok(Ast::Class { set, negated })
    }

    /// Parses a single item inside a character class. `byte` is the first
    /// byte of the item, already consumed, and `item_pos` its position.
    fn parse_class_item(
        &mut self,
        item_pos: usize,
        byte: u8,
    ) -> Result<ClassItem, ParseError> {
        match byte {
            b'\\' => match self.bump() {
                None => Err(ParseError::new(
                    item_pos,
                    ParseErrorKind::TrailingBackslash,
                )),
                Some(b'd') => Ok(ClassItem::Set(ClassSet::digit())),
                Some(b'D') => {
                    Ok(ClassItem::Set(ClassSet::digit().complement()))
                }
                Some(b'w') => Ok(ClassItem::Set(ClassSet::word())),
                Some(b'W') => {
                    Ok(ClassItem::Set(ClassSet::word().complement()))
                }
                Some(b's') => Ok(ClassItem::Set(ClassSet::space())),
                Some(b'S') => {
                    Ok(ClassItem::Set(ClassSet::space().complement()))
                }
                // Inside a class `\b` is the backspace character, not a
                // word boundary.
                Some(b'b') => Ok(ClassItem::Byte(0x08)),
                Some(escaped) => {
                    self.escape_byte(item_pos, escaped).map(ClassItem::Byte)
                }
            },
            byte if !byte.is_ascii() => Err(ParseError::new(
                item_pos,
                ParseErrorKind::NonAsciiClass,
            )),
            byte => Ok(ClassItem::Byte(byte)),
        }
    }
}
