//! Quote-aware scanning primitives used by the parser and the interpolation engine.
//!
//! The grammar is irregular, so instead of a lexer the parser is built from a
//! handful of small helpers: find a character outside quotes, extract a
//! balanced group, split on top-level commas.

use crate::constants::{INDENT_SIZE, TAB_WIDTH};
use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Returns true if `s` is a bare identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER.is_match(s)
}

/// Indentation level of a raw line: tabs count as four columns, spaces as one,
/// and the column count is divided by the indent size.
pub fn count_indent(line: &str) -> usize {
    let columns: usize = line
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum();
    columns / INDENT_SIZE
}

/// True for blank lines and lines whose first non-blank text is `;` or `//`.
pub fn is_empty_or_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with("//")
}

/// Cuts the line at the first `;` or `//` outside a double-quoted string.
pub fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut in_string = false;

    for (i, &b) in bytes.iter().enumerate() {
        if b == b'"' && (i == 0 || bytes[i - 1] != b'\\') {
            in_string = !in_string;
        }
        if !in_string {
            if b == b';' {
                return &line[..i];
            }
            if b == b'/' && bytes.get(i + 1) == Some(&b'/') {
                return &line[..i];
            }
        }
    }

    line
}

/// Finds `target` outside single- or double-quoted runs.
pub fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quote: Option<char> = None;

    for (i, ch) in s.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == target => return Some(i),
            None => {}
        }
    }

    None
}

/// Given text that starts just after an opening delimiter, returns the
/// content up to the matching close delimiter and the text after it.
///
/// Nested pairs of the same delimiters are honored. Returns `None` when the
/// group is never closed.
pub fn extract_balanced(s: &str, open: char, close: char) -> Option<(&str, &str)> {
    let mut depth = 1usize;

    for (i, ch) in s.char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some((&s[..i], &s[i + close.len_utf8()..]));
            }
        }
    }

    None
}

/// Splits on `sep` where it appears outside quotes and outside any
/// parentheses or brackets. Pieces are trimmed; empty input yields no pieces.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                continue;
            }
            None => {}
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + sep.len_utf8();
            }
            _ => {}
        }
    }

    let tail = s[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    parts
}

/// True when the text ends in a single (unescaped) backslash.
pub fn ends_with_continuation(s: &str) -> bool {
    s.ends_with('\\') && !s.ends_with("\\\\")
}

/// Removes one pair of matching surrounding quotes, if present.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    if s.len() >= 2 {
        let first = s.as_bytes()[0];
        let last = s.as_bytes()[s.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("echo hi", 0)]
    #[case("   echo hi", 0)]
    #[case("    echo hi", 1)]
    #[case("\techo hi", 1)]
    #[case("\t    echo hi", 2)]
    #[case("       echo hi", 1)]
    fn test_count_indent(#[case] line: &str, #[case] expected: usize) {
        assert_eq!(count_indent(line), expected);
    }

    #[test]
    fn test_strip_comment_respects_strings() {
        assert_eq!(strip_comment("echo hi ; trailing"), "echo hi ");
        assert_eq!(strip_comment("echo \"a;b\" // c"), "echo \"a;b\" ");
        assert_eq!(strip_comment("echo \"a // b\""), "echo \"a // b\"");
        assert_eq!(strip_comment("echo \\\"; rest"), "echo \\\"");
    }

    #[test]
    fn test_find_unquoted_skips_both_quote_styles() {
        assert_eq!(find_unquoted("a = 'x=y'", '='), Some(2));
        assert_eq!(find_unquoted("echo \"a:b\"", ':'), None);
        assert_eq!(find_unquoted("echo 'a:b' c:d", ':'), Some(12));
    }

    #[test]
    fn test_extract_balanced_nested() {
        assert_eq!(extract_balanced("a(b)c) rest", '(', ')'), Some(("a(b)c", " rest")));
        assert_eq!(extract_balanced("${x}}", '{', '}'), Some(("${x}", "")));
        assert_eq!(extract_balanced("open", '(', ')'), None);
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_top_level("a, b ,c", ','), vec!["a", "b", "c"]);
        assert_eq!(split_top_level("f(a, b), [1, 2], \"x,y\"", ','), vec!["f(a, b)", "[1, 2]", "\"x,y\""]);
        assert!(split_top_level("", ',').is_empty());
        assert_eq!(split_top_level("a,", ','), vec!["a", ""]);
    }

    #[test]
    fn test_continuation_detection() {
        assert!(ends_with_continuation("gcc \\"));
        assert!(!ends_with_continuation("echo \\\\"));
        assert!(!ends_with_continuation("echo"));
    }

    #[test]
    fn test_identifier_and_unquote() {
        assert!(is_identifier("_build2"));
        assert!(!is_identifier("2build"));
        assert!(!is_identifier("a-b"));
        assert_eq!(unquote("\"path/x\""), "path/x");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("plain"), "plain");
    }
}
