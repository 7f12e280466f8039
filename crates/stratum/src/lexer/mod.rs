// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lexer for the template dialect.
//!
//! A template mixes four grammars: HTML tags, dynamic constructs (`{{ }}`,
//! `{!! !!}`, `@directive(...)`), inline block slots (`${name|default}`) and
//! host code (`<?lua ... ?>`). The lexer keeps a stack of modes so that the
//! grammars nest: an echo inside a quoted attribute value inside a tag is
//! tokenized under the right rules, and the stack unwinds at each closing
//! delimiter.

mod scan;
#[cfg(test)]
mod tests;

use crate::error::{Result, SourceContext, StratumError};
use serde::{Deserialize, Serialize};

/// Tokenization ruleset of one embedded sub-language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grammar {
    /// Literal text and tags.
    Html,
    /// Echoes and directives.
    Dynamic,
    /// `${name|default}` block slots.
    Inline,
    /// Host-language code.
    Host,
}

impl Grammar {
    /// Lowercase name of the grammar.
    pub fn as_str(&self) -> &'static str {
        match self {
            Grammar::Html => "html",
            Grammar::Dynamic => "dynamic",
            Grammar::Inline => "inline",
            Grammar::Host => "host",
        }
    }
}

/// Kind and payload of a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text; the text is carried in [`Token::text`] with escapes resolved.
    Raw,
    /// `<name`
    TagOpen(String),
    /// Attribute name inside a tag.
    AttrName(String),
    /// Opening quote of an attribute value.
    AttrValueStart(char),
    /// Closing quote of an attribute value.
    AttrValueEnd,
    /// Unquoted attribute value.
    AttrUnquoted(String),
    /// `>` closing an opening tag.
    TagEnd,
    /// `/>`
    TagSelfClose,
    /// `</name>`
    TagClose(String),
    /// `{{ expr }}` (escaped) or `{!! expr !!}`.
    Echo {
        /// Expression text.
        expr: String,
        /// Whether the output is escaped.
        escape: bool,
    },
    /// `@name` or `@name(body)`.
    Directive {
        /// Directive name.
        name: String,
        /// Text between the parentheses.
        body: Option<String>,
    },
    /// `${name}` or `${name|default}`.
    Inline {
        /// Block name.
        name: String,
        /// Default content.
        default: Option<String>,
    },
    /// `<?lua code ?>`
    Host(String),
}

/// A token with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Kind and payload.
    pub kind: TokenKind,
    /// Source text of the token (resolved text for [`TokenKind::Raw`]).
    pub text: String,
    /// Byte offset of the token start.
    pub offset: usize,
    /// 1-based line of the token start.
    pub line: usize,
    /// Grammar that produced the token.
    pub grammar: Grammar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LexerMode {
    /// Literal text with tags and dynamic constructs.
    Text,
    /// Inside `<name ...` up to `>` or `/>`.
    Tag { name: String, start: usize },
    /// Inside a quoted attribute value.
    AttrValue { quote: char, start: usize },
    /// Body of `<script>`/`<style>`: no tags until the matching close tag.
    RawText { name: String },
}

/// Elements whose body is not tokenized as HTML.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// The template lexer.
pub struct Lexer<'a> {
    source: &'a str,
    file: &'a str,
    pos: usize,
    line_starts: Vec<usize>,
    mode_stack: Vec<LexerMode>,
    html: bool,
    tokens: Vec<Token>,
    raw: String,
    raw_start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer for `source`; `file` is used in diagnostics.
    pub fn new(source: &'a str, file: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));

        Self {
            source,
            file,
            pos: 0,
            line_starts,
            mode_stack: vec![LexerMode::Text],
            html: true,
            tokens: Vec::new(),
            raw: String::new(),
            raw_start: 0,
        }
    }

    /// Tokenizes the whole source starting under `start`.
    ///
    /// Starting under [`Grammar::Host`] yields a single host token; starting
    /// under [`Grammar::Dynamic`] or [`Grammar::Inline`] disables tag syntax.
    pub fn tokenize(mut self, start: Grammar) -> Result<Vec<Token>> {
        match start {
            Grammar::Host => {
                if !self.source.is_empty() {
                    self.push(TokenKind::Host(self.source.to_string()), 0, self.source.len(), Grammar::Host);
                }
                return Ok(self.tokens);
            }
            Grammar::Dynamic | Grammar::Inline => self.html = false,
            Grammar::Html => {}
        }

        while self.pos < self.source.len() {
            match self.mode() {
                LexerMode::Text => self.lex_text()?,
                LexerMode::Tag { name, .. } => self.lex_tag(&name)?,
                LexerMode::AttrValue { quote, .. } => self.lex_attr_value(quote)?,
                LexerMode::RawText { name } => self.lex_raw_text(&name)?,
            }
        }

        match self.mode() {
            LexerMode::Tag { name, start } => {
                return Err(self.error(start, format!("unterminated tag <{}>", name)));
            }
            LexerMode::AttrValue { quote, start } => {
                return Err(self.error(start, format!("unterminated attribute value, missing {}", quote)));
            }
            LexerMode::Text | LexerMode::RawText { .. } => {}
        }

        self.flush_raw();
        Ok(self.tokens)
    }

    fn mode(&self) -> LexerMode {
        self.mode_stack.last().cloned().unwrap_or(LexerMode::Text)
    }

    fn push_mode(&mut self, mode: LexerMode) {
        self.mode_stack.push(mode);
    }

    fn pop_mode(&mut self) {
        if self.mode_stack.len() > 1 {
            self.mode_stack.pop();
        }
    }

    fn remaining(&self) -> &'a str {
        &self.source[self.pos..]
    }

    /// 1-based line of a byte offset.
    pub(crate) fn line_at(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    fn error(&self, offset: usize, message: String) -> StratumError {
        let line = self.line_at(offset);
        let column = offset - self.line_starts[line - 1] + 1;
        StratumError::LexError {
            message,
            file: self.file.to_string(),
            line,
            source_context: Some(SourceContext::from_source(self.source, line, column)),
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize, grammar: Grammar) {
        self.flush_raw();
        self.tokens.push(Token {
            kind,
            text: self.source[start..end].to_string(),
            offset: start,
            line: self.line_at(start),
            grammar,
        });
    }

    fn flush_raw(&mut self) {
        if self.raw.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.raw);
        self.tokens.push(Token {
            kind: TokenKind::Raw,
            text,
            offset: self.raw_start,
            line: self.line_at(self.raw_start),
            grammar: Grammar::Html,
        });
    }

    fn push_raw(&mut self, text: &str) {
        if self.raw.is_empty() {
            self.raw_start = self.pos;
        }
        self.raw.push_str(text);
    }

    /// Consumes literal text up to the next character that may start a construct.
    fn consume_raw_run(&mut self, specials: &[char]) {
        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return;
        };
        let skip = first.len_utf8();
        let len = rest[skip..]
            .find(|c: char| specials.contains(&c))
            .map(|i| i + skip)
            .unwrap_or(rest.len());
        self.push_raw(&rest[..len]);
        self.pos += len;
    }

    fn lex_text(&mut self) -> Result<()> {
        if self.lex_dynamic(true)? {
            return Ok(());
        }

        if self.html {
            let rest = self.remaining();
            if rest.starts_with("<!--") {
                let end = rest
                    .find("-->")
                    .ok_or_else(|| self.error(self.pos, "unterminated comment".to_string()))?;
                self.push_raw(&rest[..end + 3]);
                self.pos += end + 3;
                return Ok(());
            }
            if let Some(after) = rest.strip_prefix("</") {
                let name = scan::tag_name(after);
                if !name.is_empty() {
                    let start = self.pos;
                    let tail = &after[name.len()..];
                    let close = tail.trim_start();
                    if !close.starts_with('>') {
                        return Err(self.error(start, format!("malformed closing tag </{}", name)));
                    }
                    let end = start + 2 + name.len() + (tail.len() - close.len()) + 1;
                    self.push(TokenKind::TagClose(name.to_string()), start, end, Grammar::Html);
                    self.pos = end;
                    return Ok(());
                }
            }
            if let Some(after) = rest.strip_prefix('<') {
                let name = scan::tag_name(after);
                if after.starts_with(|c: char| c.is_ascii_alphabetic()) && !name.is_empty() {
                    let start = self.pos;
                    let end = start + 1 + name.len();
                    self.push(TokenKind::TagOpen(name.to_string()), start, end, Grammar::Html);
                    self.pos = end;
                    self.push_mode(LexerMode::Tag {
                        name: name.to_string(),
                        start,
                    });
                    return Ok(());
                }
            }
        }

        self.consume_raw_run(&['<', '{', '@', '$']);
        Ok(())
    }

    fn lex_tag(&mut self, tag_name: &str) -> Result<()> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
        if trimmed.is_empty() {
            return Ok(());
        }

        let start = self.pos;
        if trimmed.starts_with("/>") {
            self.push(TokenKind::TagSelfClose, start, start + 2, Grammar::Html);
            self.pos += 2;
            self.pop_mode();
            return Ok(());
        }
        if trimmed.starts_with('>') {
            self.push(TokenKind::TagEnd, start, start + 1, Grammar::Html);
            self.pos += 1;
            self.pop_mode();
            if RAW_TEXT_ELEMENTS.iter().any(|e| e.eq_ignore_ascii_case(tag_name)) {
                self.push_mode(LexerMode::RawText {
                    name: tag_name.to_string(),
                });
            }
            return Ok(());
        }

        // echoes, directives and host code may stand in attribute position
        if trimmed.starts_with("{{") || trimmed.starts_with("{!!") || trimmed.starts_with("<?lua")
            || (trimmed.starts_with('@') && scan::ident(&trimmed[1..]).is_some())
        {
            if self.lex_dynamic(false)? {
                return Ok(());
            }
        }

        let name_len = trimmed
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '"' || c == '\'' || c == '<')
            .unwrap_or(trimmed.len());
        let name_len = if trimmed[..name_len].ends_with('/') && trimmed[name_len..].starts_with('>') {
            name_len - 1
        } else {
            name_len
        };
        if name_len == 0 {
            let ch = trimmed.chars().next().unwrap_or(' ');
            return Err(self.error(start, format!("unexpected character '{}' in tag <{}>", ch, tag_name)));
        }

        let name = &trimmed[..name_len];
        self.push(TokenKind::AttrName(name.to_string()), start, start + name_len, Grammar::Html);
        self.pos += name_len;

        let rest = self.remaining();
        let after_ws = rest.trim_start();
        if let Some(value) = after_ws.strip_prefix('=') {
            self.pos += rest.len() - after_ws.len() + 1;
            let value_trimmed = value.trim_start();
            self.pos += value.len() - value_trimmed.len();
            let value_start = self.pos;
            match value_trimmed.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    self.push(TokenKind::AttrValueStart(quote), value_start, value_start + 1, Grammar::Html);
                    self.pos += 1;
                    self.push_mode(LexerMode::AttrValue {
                        quote,
                        start: value_start,
                    });
                }
                Some(_) => {
                    let len = value_trimmed
                        .find(|c: char| c.is_whitespace() || c == '>')
                        .unwrap_or(value_trimmed.len());
                    let len = if value_trimmed[..len].ends_with('/') && value_trimmed[len..].starts_with('>') {
                        len - 1
                    } else {
                        len
                    };
                    self.push(
                        TokenKind::AttrUnquoted(value_trimmed[..len].to_string()),
                        value_start,
                        value_start + len,
                        Grammar::Html,
                    );
                    self.pos += len;
                }
                None => {}
            }
        }

        Ok(())
    }

    fn lex_attr_value(&mut self, quote: char) -> Result<()> {
        if self.remaining().starts_with(quote) {
            let start = self.pos;
            self.push(TokenKind::AttrValueEnd, start, start + 1, Grammar::Html);
            self.pos += 1;
            self.pop_mode();
            return Ok(());
        }
        if self.lex_dynamic(true)? {
            return Ok(());
        }
        self.consume_raw_run(&[quote, '{', '@', '$', '<']);
        Ok(())
    }

    fn lex_raw_text(&mut self, name: &str) -> Result<()> {
        let rest = self.remaining();
        if let Some(after) = rest.strip_prefix("</") {
            if scan::tag_name(after).eq_ignore_ascii_case(name) {
                self.pop_mode();
                return Ok(());
            }
        }
        if !rest.starts_with("${") && self.lex_dynamic(true)? {
            return Ok(());
        }
        self.consume_raw_run(&['<', '{', '@']);
        Ok(())
    }

    /// Tokenizes a dynamic, inline or host construct at the current position.
    ///
    /// Returns `false` when nothing was recognized. `escapes` enables the
    /// `@@` and `@{{` text escapes, which only make sense where raw text is collected.
    fn lex_dynamic(&mut self, escapes: bool) -> Result<bool> {
        let rest = self.remaining();
        let start = self.pos;

        if let Some(body) = rest.strip_prefix("<?lua") {
            let end = body
                .find("?>")
                .ok_or_else(|| self.error(start, "unterminated <?lua block, missing ?>".to_string()))?;
            let total = 5 + end + 2;
            self.push(TokenKind::Host(body[..end].to_string()), start, start + total, Grammar::Host);
            self.pos += total;
            return Ok(true);
        }

        if rest.starts_with("{{--") {
            let end = rest
                .find("--}}")
                .ok_or_else(|| self.error(start, "unterminated comment, missing --}}".to_string()))?;
            self.flush_raw();
            self.pos += end + 4;
            return Ok(true);
        }

        if rest.starts_with("{!!") {
            let end = scan::delimited(rest, 3, "!!}")
                .ok_or_else(|| self.error(start, "unterminated {!! echo, missing !!}".to_string()))?;
            let expr = rest[3..end].trim().to_string();
            self.push(TokenKind::Echo { expr, escape: false }, start, start + end + 3, Grammar::Dynamic);
            self.pos += end + 3;
            return Ok(true);
        }

        if rest.starts_with("{{") {
            let end = scan::delimited(rest, 2, "}}")
                .ok_or_else(|| self.error(start, "unterminated {{ echo, missing }}".to_string()))?;
            let expr = rest[2..end].trim().to_string();
            self.push(TokenKind::Echo { expr, escape: true }, start, start + end + 2, Grammar::Dynamic);
            self.pos += end + 2;
            return Ok(true);
        }

        if escapes && rest.starts_with("@@") {
            self.push_raw("@");
            self.pos += 2;
            return Ok(true);
        }

        if escapes && rest.starts_with("@{{") {
            self.push_raw("{{");
            self.pos += 3;
            return Ok(true);
        }

        if let Some(after) = rest.strip_prefix('@') {
            let prev = self.source[..start].chars().next_back();
            let attached = prev.is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '.');
            if let (Some(name), false) = (scan::ident(after), attached) {
                let mut end = 1 + name.len();
                let mut body = None;
                if rest[end..].starts_with('(') {
                    let close = scan::balanced(rest, end).ok_or_else(|| {
                        self.error(start, format!("unterminated directive @{}(, missing )", name))
                    })?;
                    body = Some(rest[end + 1..close].to_string());
                    end = close + 1;
                }
                self.push(
                    TokenKind::Directive {
                        name: name.to_string(),
                        body,
                    },
                    start,
                    start + end,
                    Grammar::Dynamic,
                );
                self.pos += end;
                return Ok(true);
            }
        }

        if rest.starts_with("${") {
            if let Some((name, default, len)) = scan::inline_block(rest) {
                self.push(TokenKind::Inline { name, default }, start, start + len, Grammar::Inline);
                self.pos += len;
                return Ok(true);
            }
        }

        Ok(false)
    }
}

/// Tokenizes `source` under the HTML grammar.
pub fn tokenize(source: &str, file: &str) -> Result<Vec<Token>> {
    Lexer::new(source, file).tokenize(Grammar::Html)
}
