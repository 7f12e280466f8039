// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Scanning helpers for delimited regions.
//!
//! Host expressions may contain strings and nested brackets, so closing
//! delimiters are only recognized outside Lua string literals and at
//! bracket depth zero.

/// Leading tag name characters of `s`.
pub(super) fn tag_name(s: &str) -> &str {
    let len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
        .unwrap_or(s.len());
    &s[..len]
}

/// Leading identifier of `s` (`[A-Za-z_][A-Za-z0-9_]*`).
pub(super) fn ident(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let len = s
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    Some(&s[..len])
}

/// Length of the string literal starting at `s[0]`, or `None` if unterminated.
fn string_literal(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let (_, quote) = chars.next()?;
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == quote {
            return Some(i + c.len_utf8());
        }
    }
    None
}

/// Finds `close` after the opening delimiter of length `open_len`.
///
/// Returns the byte offset of `close` in `s`.
pub(super) fn delimited(s: &str, open_len: usize, close: &str) -> Option<usize> {
    let mut i = open_len;
    let mut depth = 0usize;
    while i < s.len() {
        let rest = &s[i..];
        if depth == 0 && rest.starts_with(close) {
            return Some(i);
        }
        let c = rest.chars().next()?;
        match c {
            '"' | '\'' => {
                i += string_literal(rest)?;
                continue;
            }
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += c.len_utf8();
    }
    None
}

/// Finds the `)` matching the `(` at `s[open]`.
pub(super) fn balanced(s: &str, open: usize) -> Option<usize> {
    let mut i = open;
    let mut depth = 0usize;
    while i < s.len() {
        let rest = &s[i..];
        let c = rest.chars().next()?;
        match c {
            '"' | '\'' => {
                i += string_literal(rest)?;
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += c.len_utf8();
    }
    None
}

/// Parses `${name}` or `${name|default}` at the start of `s`.
///
/// Returns the name, the default and the consumed length. Anything that is
/// not a plain slot name is left to the raw text grammar.
pub(super) fn inline_block(s: &str) -> Option<(String, Option<String>, usize)> {
    let body = s.strip_prefix("${")?;
    let end = body.find('}')?;
    let inner = &body[..end];
    let (name, default) = match inner.split_once('|') {
        Some((name, default)) => (name.trim(), Some(default.to_string())),
        None => (inner.trim(), None),
    };
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if !valid {
        return None;
    }
    Some((name.to_string(), default, 2 + end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delimited_skips_strings_and_braces() {
        let s = r#"{{ {a = "}}"} }} tail"#;
        let end = delimited(s, 2, "}}").unwrap();
        assert_eq!(&s[end..end + 2], "}}");
        assert_eq!(&s[2..end], r#" {a = "}}"} "#);
    }

    #[test]
    fn test_balanced_nested() {
        let s = "@route('home', fn(x), \")\") rest";
        let open = s.find('(').unwrap();
        let close = balanced(s, open).unwrap();
        assert_eq!(&s[close + 1..], " rest");
    }

    #[test]
    fn test_balanced_unterminated() {
        assert_eq!(balanced("(a, (b)", 0), None);
    }

    #[test]
    fn test_inline_block() {
        assert_eq!(
            inline_block("${title|Hello world} x"),
            Some(("title".to_string(), Some("Hello world".to_string()), 20))
        );
        assert_eq!(inline_block("${ body }"), Some(("body".to_string(), None, 9)));
        assert_eq!(inline_block("${a + b}"), None);
    }
}
