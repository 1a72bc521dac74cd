use itertools::Itertools;
use pretty_assertions::assert_eq;

use crate::bitmapset::BitmapSet;
use crate::compiler::Compiler;
use crate::parser;
use crate::parser::ParseErrorKind;
use crate::pikevm::{epsilon_closure, EpsilonClosureState};
use crate::{compile, match_string, version, Error, Match};

macro_rules! assert_re_code {
    ($re:expr, $code:expr, $closure:expr) => {{
        let code = Compiler::new()
            .compile(&parser::parse($re).unwrap())
            .unwrap();

        assert_eq!($code, code.to_string());

        let mut closure = BitmapSet::new();
        let mut cache = EpsilonClosureState::new();

        epsilon_closure(
            code.as_ref(),
            0,
            None,
            None,
            &mut cache,
            &mut closure,
        );

        assert_eq!($closure, closure.iter().copied().collect_vec());
    }};
}

macro_rules! assert_parse_err {
    ($re:expr, $position:expr, $kind:expr) => {{
        let err = parser::parse($re).unwrap_err();
        assert_eq!(($position, $kind), (err.position, err.kind));
    }};
}

#[test]
fn re_code_1() {
    assert_re_code!(
        "abcd",
        r#"
00000: LIT 0x61
00001: LIT 0x62
00002: LIT 0x63
00003: LIT 0x64
00004: MATCH
"#,
        // Epsilon closure starting at code 0.
        vec![0x00]
    );
}

#[test]
fn re_code_2() {
    assert_re_code!(
        "ab|cd",
        r#"
00000: SPLIT_N(0) 0000d 00015
0000d: LIT 0x61
0000e: LIT 0x62
0000f: JUMP 00017
00015: LIT 0x63
00016: LIT 0x64
00017: MATCH
"#,
        vec![0x0d, 0x15]
    );
}

#[test]
fn re_code_3() {
    assert_re_code!(
        "ab?c",
        r#"
00000: LIT 0x61
00001: SPLIT_A(0) 0000a
00009: LIT 0x62
0000a: LIT 0x63
0000b: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_4() {
    assert_re_code!(
        "a*b",
        r#"
00000: SPLIT_A(0) 0000f
00008: LIT 0x61
00009: JUMP 00000
0000f: LIT 0x62
00010: MATCH
"#,
        // The greedy repetition prefers its body over the exit.
        vec![0x08, 0x0f]
    );
}

#[test]
fn re_code_5() {
    assert_re_code!(
        "a*?b",
        r#"
00000: SPLIT_B(0) 0000f
00008: LIT 0x61
00009: JUMP 00000
0000f: LIT 0x62
00010: MATCH
"#,
        // The lazy repetition prefers the exit over its body.
        vec![0x0f, 0x08]
    );
}

#[test]
fn re_code_6() {
    assert_re_code!(
        "a+b",
        r#"
00000: LIT 0x61
00001: SPLIT_B(0) 00000
00009: LIT 0x62
0000a: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_7() {
    assert_re_code!(
        "(a|b)*c",
        r#"
00000: SPLIT_A(0) 00023
00008: SPLIT_N(1) 00015 0001c
00015: LIT 0x61
00016: JUMP 0001d
0001c: LIT 0x62
0001d: JUMP 00000
00023: LIT 0x63
00024: MATCH
"#,
        vec![0x15, 0x1c, 0x23]
    );
}

#[test]
fn re_code_8() {
    assert_re_code!(
        "[0-9a-f]+",
        r#"
00000: CLASS_RANGES [0x30-0x39] [0x61-0x66]
00007: SPLIT_B(0) 00000
0000f: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_9() {
    // Negated classes are compiled as the complement of their set.
    assert_re_code!(
        "[^ab]",
        r#"
00000: CLASS_RANGES [0x00-0x60] [0x63-0xff]
00007: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_10() {
    assert_re_code!(
        r"\w",
        r#"
00000: CLASS_RANGES [0x30-0x39] [0x41-0x5a] [0x5f-0x5f] [0x61-0x7a]
0000b: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_11() {
    // A class with 16 or more ranges is emitted as a bitmap.
    assert_re_code!(
        "[02468acegikmoqsu]",
        r#"
00000: CLASS_BITMAP 0x30 0x32 0x34 0x36 0x38 0x61 0x63 0x65 0x67 0x69 0x6b 0x6d 0x6f 0x71 0x73 0x75
00022: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_12() {
    assert_re_code!(
        "^ab$",
        r#"
00000: START
00002: LIT 0x61
00003: LIT 0x62
00004: END
00006: MATCH
"#,
        // With no byte before the starting point `^` holds, so the
        // closure goes through it.
        vec![0x02]
    );
}

#[test]
fn re_code_13() {
    // An empty alternative matches the empty string; its branch jumps
    // straight to the join point.
    assert_re_code!(
        "|a",
        r#"
00000: SPLIT_N(0) 0000d 00013
0000d: JUMP 00014
00013: LIT 0x61
00014: MATCH
"#,
        vec![0x14, 0x13]
    );
}

#[test]
fn re_code_14() {
    // A repetition whose body can match the empty string. The closure
    // must terminate: the outer split is executed only once, even though
    // the loop jumps back to it.
    assert_re_code!(
        "(a?)*",
        r#"
00000: SPLIT_A(0) 00017
00008: SPLIT_A(1) 00011
00010: LIT 0x61
00011: JUMP 00000
00017: MATCH
"#,
        vec![0x10, 0x17]
    );
}

#[test]
fn re_code_15() {
    // Braces are plain literals, there's no counted repetition.
    assert_re_code!(
        "a{2}",
        r#"
00000: LIT 0x61
00001: LIT 0x7b
00002: LIT 0x32
00003: LIT 0x7d
00004: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn re_code_16() {
    // A literal 0xAA is the opcode prefix and is encoded twice, hence
    // the MATCH instruction at address 2.
    assert_re_code!(
        r"\xAA",
        r#"
00000: LIT 0xaa
00002: MATCH
"#,
        vec![0x00]
    );
}

#[test]
fn word_boundary_closure() {
    let code = Compiler::new()
        .compile(&parser::parse(r"\ba").unwrap())
        .unwrap();

    let mut closure = BitmapSet::new();
    let mut cache = EpsilonClosureState::new();

    // At the start of the text, right before a word byte, `\b` holds and
    // the closure goes through it.
    epsilon_closure(
        code.as_ref(),
        0,
        Some(b'a'),
        None,
        &mut cache,
        &mut closure,
    );
    assert_eq!(vec![0x02], closure.iter().copied().collect_vec());

    closure.clear();

    // Between two word bytes it doesn't.
    epsilon_closure(
        code.as_ref(),
        0,
        Some(b'a'),
        Some(b'x'),
        &mut cache,
        &mut closure,
    );
    assert!(closure.is_empty());
}

#[test]
fn parse_errors() {
    assert_parse_err!("", 0, ParseErrorKind::EmptyPattern);
    assert_parse_err!("*", 0, ParseErrorKind::NothingToRepeat);
    assert_parse_err!("+a", 0, ParseErrorKind::NothingToRepeat);
    assert_parse_err!("a**", 2, ParseErrorKind::NothingToRepeat);
    assert_parse_err!("a|*", 2, ParseErrorKind::NothingToRepeat);
    assert_parse_err!("(a", 0, ParseErrorKind::UnbalancedParen);
    assert_parse_err!("a)", 1, ParseErrorKind::UnbalancedParen);
    assert_parse_err!("(a))", 3, ParseErrorKind::UnbalancedParen);
    assert_parse_err!("]", 0, ParseErrorKind::UnbalancedBracket);
    assert_parse_err!("[]", 0, ParseErrorKind::EmptyClass);
    assert_parse_err!("[^]", 0, ParseErrorKind::EmptyClass);
    assert_parse_err!("[a", 0, ParseErrorKind::UnclosedClass);
    assert_parse_err!("[a-", 0, ParseErrorKind::UnclosedClass);
    assert_parse_err!("[]a]", 0, ParseErrorKind::EmptyClass);
    assert_parse_err!("[z-a]", 1, ParseErrorKind::InvalidClassRange);
    assert_parse_err!("[a-\\d]", 1, ParseErrorKind::InvalidClassRange);
    assert_parse_err!("[é]", 1, ParseErrorKind::NonAsciiClass);
    assert_parse_err!("a\\", 1, ParseErrorKind::TrailingBackslash);
    assert_parse_err!("\\q", 0, ParseErrorKind::InvalidEscape);
    assert_parse_err!("\\x4", 0, ParseErrorKind::InvalidEscape);
    assert_parse_err!("\\xzz", 0, ParseErrorKind::InvalidEscape);
}

#[test]
fn parse_error_display() {
    assert_eq!(
        parser::parse("").unwrap_err().to_string(),
        "syntax error at position 0: empty pattern"
    );
    assert_eq!(
        parser::parse("[]").unwrap_err().to_string(),
        "syntax error at position 0: empty character class"
    );
}

/// Compiles `pattern` and matches it against `text` at offset 0,
/// returning `(position, length)`.
fn m(pattern: &str, text: &str) -> Option<(usize, usize)> {
    compile(pattern)
        .unwrap()
        .match_at(text.as_bytes(), 0)
        .unwrap()
        .map(|m| (m.position, m.length))
}

/// Like [`m`], but anchored at `start`.
fn m_at(pattern: &str, text: &str, start: usize) -> Option<(usize, usize)> {
    compile(pattern)
        .unwrap()
        .match_at(text.as_bytes(), start)
        .unwrap()
        .map(|m| (m.position, m.length))
}

/// Compiles `pattern` and finds all matches in `text`.
fn all(pattern: &str, text: &str) -> Vec<(usize, usize)> {
    compile(pattern)
        .unwrap()
        .find_all(text.as_bytes(), usize::MAX)
        .unwrap()
        .into_iter()
        .map(|m| (m.position, m.length))
        .collect_vec()
}

#[test]
fn literals() {
    assert_eq!(m("a", "abc"), Some((0, 1)));
    assert_eq!(m("ab", "abc"), Some((0, 2)));
    assert_eq!(m("abc", "abc"), Some((0, 3)));
    assert_eq!(m("d", "abc"), None);
    assert_eq!(m("abcd", "abc"), None);
    assert_eq!(m("a", ""), None);
}

#[test]
fn any_byte() {
    assert_eq!(m(".", "abc"), Some((0, 1)));
    assert_eq!(m("a.c", "abc"), Some((0, 3)));
    assert_eq!(m(".", ""), None);
    // `.` matches any byte, newlines included.
    assert_eq!(m(".", "\n"), Some((0, 1)));
}

#[test]
fn alternation() {
    assert_eq!(m("a|b", "abc"), Some((0, 1)));
    assert_eq!(m("a|b", "bcd"), Some((0, 1)));
    assert_eq!(m("x|y", "abc"), None);
    assert_eq!(m("foo|bar|baz", "bazaar"), Some((0, 3)));
    // The first alternative that matches wins, even if a later one
    // would match more.
    assert_eq!(m("a|ab", "abc"), Some((0, 1)));
    assert_eq!(m("ab|a", "abc"), Some((0, 2)));
}

#[test]
fn repetition() {
    assert_eq!(m("a*", "aabc"), Some((0, 2)));
    assert_eq!(m("a*", "bbb"), Some((0, 0)));
    assert_eq!(m("a+", "aaab"), Some((0, 3)));
    assert_eq!(m("a+", "bbb"), None);
    assert_eq!(m("a?", "abc"), Some((0, 1)));
    assert_eq!(m("a?", "bcd"), Some((0, 0)));
    assert_eq!(m("ab*c", "abbbbc"), Some((0, 6)));
    assert_eq!(m("ab+c", "ac"), None);
}

#[test]
fn lazy_repetition() {
    assert_eq!(m("a*?", "aaa"), Some((0, 0)));
    assert_eq!(m("a+?", "aaa"), Some((0, 1)));
    assert_eq!(m("a??", "a"), Some((0, 0)));
    // The lazy repetition still matches as much as needed.
    assert_eq!(m("a*?b", "aaab"), Some((0, 4)));
}

#[test]
fn classes() {
    assert_eq!(m("[abc]", "bcd"), Some((0, 1)));
    assert_eq!(m("[abc]", "def"), None);
    assert_eq!(m("[^abc]", "def"), Some((0, 1)));
    assert_eq!(m("[^abc]", "abc"), None);
    assert_eq!(m("[a-z]+", "hello world"), Some((0, 5)));
    assert_eq!(m("[0-9]+", "42x"), Some((0, 2)));
    assert_eq!(m("[-a]", "-"), Some((0, 1)));
    assert_eq!(m("[a-]", "-"), Some((0, 1)));
}

#[test]
fn perl_classes() {
    assert_eq!(m(r"\d+", "123abc"), Some((0, 3)));
    assert_eq!(m(r"\D", "a"), Some((0, 1)));
    assert_eq!(m(r"\D", "1"), None);
    assert_eq!(m(r"\w+", "foo_bar baz"), Some((0, 7)));
    assert_eq!(m(r"\W", " "), Some((0, 1)));
    assert_eq!(m(r"\s", "\t"), Some((0, 1)));
    assert_eq!(m(r"\S", " "), None);
    // Perl classes inside a bracketed class.
    assert_eq!(m(r"[\d]", "5"), Some((0, 1)));
    assert_eq!(m(r"[\w.]+", "a.b c"), Some((0, 3)));
    assert_eq!(m(r"[^\w]", " "), Some((0, 1)));
}

#[test]
fn escapes() {
    assert_eq!(m(r"\.", "a"), None);
    assert_eq!(m(r"\.", ".a"), Some((0, 1)));
    assert_eq!(m(r"\*\+", "*+"), Some((0, 2)));
    assert_eq!(m(r"\x41", "A"), Some((0, 1)));
    assert_eq!(m(r"\n", "\n"), Some((0, 1)));
    assert_eq!(m(r"\t", "\t"), Some((0, 1)));
    assert_eq!(m(r"[\n\t]", "\t"), Some((0, 1)));
    // Inside a class `\b` is a backspace, not a word boundary.
    assert_eq!(m(r"[\b]", "\x08"), Some((0, 1)));
}

#[test]
fn anchors() {
    assert_eq!(m("^abc", "abcdef"), Some((0, 3)));
    assert_eq!(m("^bc", "abc"), None);
    assert_eq!(m_at("^a", "ba", 1), None);
    assert_eq!(m_at("c$", "abc", 2), Some((2, 1)));
    assert_eq!(m("a$", "abc"), None);
    assert_eq!(m("^abc$", "abc"), Some((0, 3)));
    assert_eq!(m("^abc$", "abcd"), None);
    assert_eq!(m("^", "abc"), Some((0, 0)));
    assert_eq!(m_at("$", "abc", 3), Some((3, 0)));
    assert_eq!(all("^a", "aaa"), vec![(0, 1)]);
}

#[test]
fn word_boundaries() {
    assert_eq!(m(r"\bfoo\b", "foo bar"), Some((0, 3)));
    assert_eq!(m(r"\bfoo\b", "foobar"), None);
    assert_eq!(all(r"\bbar\b", "foobar"), vec![]);
    assert_eq!(all(r"\bbar\b", "foo bar"), vec![(4, 3)]);
    assert_eq!(m_at(r"\Bar", "bar", 1), Some((1, 2)));
    assert_eq!(m(r"\Bar", "bar"), None);
}

#[test]
fn groups() {
    assert_eq!(m("(ab)+", "ababx"), Some((0, 4)));
    assert_eq!(m("(a|b)c", "bc"), Some((0, 2)));
    assert_eq!(m("a(b(c|d))e", "abde"), Some((0, 4)));
    assert_eq!(m("()", "x"), Some((0, 0)));
}

#[test]
fn empty_width_loops_terminate() {
    assert_eq!(m("(a?)*", "aab"), Some((0, 2)));
    assert_eq!(m("()*", "a"), Some((0, 0)));
    assert_eq!(m("(a*)*", "aaa"), Some((0, 3)));
    assert_eq!(m("(a*)+", "b"), Some((0, 0)));
}

#[test]
fn find_all() {
    assert_eq!(
        all("a", "abacada"),
        vec![(0, 1), (2, 1), (4, 1), (6, 1)]
    );
    // Matches never overlap; the search resumes past each match end.
    assert_eq!(all("aba", "ababa"), vec![(0, 3)]);
    assert_eq!(all("x", "abc"), vec![]);
    // Zero-length matches advance one byte at a time.
    assert_eq!(all("a*", "bb"), vec![(0, 0), (1, 0), (2, 0)]);
    assert_eq!(all(r"\d+", "a1b22c333"), vec![(1, 1), (3, 2), (6, 3)]);
}

#[test]
fn find_all_max_matches() {
    let re = compile("a").unwrap();
    assert_eq!(re.find_all(b"aaaa", 2).unwrap().len(), 2);
    assert_eq!(re.find_all(b"aaaa", 4).unwrap().len(), 4);
    assert_eq!(re.find_all(b"aaaa", 100).unwrap().len(), 4);
    assert_eq!(
        re.find_all(b"aaaa", 0).unwrap_err(),
        Error::ZeroMaxMatches
    );
}

#[test]
fn find_all_is_deterministic() {
    let re = compile(r"[a-z]+").unwrap();
    let text = b"one two three four";
    assert_eq!(re.find_all(text, 10).unwrap(), re.find_all(text, 10).unwrap());
}

#[test]
fn match_at_start_offsets() {
    let re = compile("a*").unwrap();
    // Matching at the very end of the text is fine, the pattern matches
    // the empty string there.
    assert_eq!(
        re.match_at(b"ab", 2).unwrap(),
        Some(Match { position: 2, length: 0 })
    );
    assert_eq!(
        re.match_at(b"ab", 3).unwrap_err(),
        Error::StartOutOfBounds { start: 3, len: 2 }
    );
    assert_eq!(
        re.match_at(b"", 1).unwrap_err(),
        Error::StartOutOfBounds { start: 1, len: 0 }
    );
}

#[test]
fn match_string_equals_compile_then_match() {
    for (pattern, text) in [
        ("a", "abc"),
        ("a*b", "aaab"),
        ("x|y", "zzz"),
        (r"\d+", "123"),
        ("[^a]", "b"),
    ] {
        assert_eq!(
            match_string(pattern, text.as_bytes(), 0).unwrap(),
            compile(pattern)
                .unwrap()
                .match_at(text.as_bytes(), 0)
                .unwrap(),
        );
    }
}

#[test]
fn compile_errors() {
    assert!(matches!(compile(""), Err(Error::Parse(_))));
    assert!(matches!(compile("*"), Err(Error::Parse(_))));
    assert!(matches!(compile("[]"), Err(Error::Parse(_))));

    // 256 alternatives are too many.
    let pattern = vec!["a"; 256].join("|");
    assert_eq!(
        compile(pattern.as_str()).unwrap_err(),
        Error::TooManyAlternatives
    );

    // 255 are fine.
    let pattern = vec!["a"; 255].join("|");
    assert!(compile(pattern.as_str()).is_ok());
}

#[test]
fn non_ascii_literals() {
    // Non-ASCII literals match their UTF-8 byte sequence; positions and
    // lengths are byte offsets.
    assert_eq!(m("é", "équipe"), Some((0, 2)));
    assert_eq!(all("é", "née"), vec![(1, 2)]);
}

#[test]
fn regexp_equality() {
    assert_eq!(compile("a").unwrap(), compile("a").unwrap());
    assert_ne!(compile("a").unwrap(), compile("b").unwrap());
    assert_eq!(compile("a|b").unwrap().pattern(), "a|b");
}

#[test]
fn version_string() {
    assert_eq!(version(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn pathological_pattern() {
    // The classic backtracking killer: (a+)+ against a long run of `a`s
    // followed by a `b`. A backtracking engine takes exponential time
    // here; the Thompson simulation doesn't.
    let text = "a".repeat(64) + "b";
    assert_eq!(m("(a+)+$", text.as_str()), None);
    assert_eq!(m("(a+)+", text.as_str()), Some((0, 64)));
}
