// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template parser.
//!
//! Assembles the token stream of one template file into a [`Node::Template`]
//! tree. Each grammar has its own syntax handler: HTML tokens build the
//! element tree with strict open/close matching, dynamic tokens become
//! [`Echo`] and [`Directive`] nodes, inline tokens become [`Block`] slots and
//! host tokens become [`HostCode`].

mod args;

pub use args::split_values;

use crate::ast::{Attr, AttrValue, Block, Closing, Context, Directive, Echo, HostCode, Node, Raw, Tag};
use crate::error::{Result, SourceContext, StratumError};
use crate::lexer::{tokenize, Grammar, Token, TokenKind};
use std::iter::Peekable;
use std::vec::IntoIter;

/// HTML elements that never have content or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Returns true for HTML void elements.
pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

type Tokens = Peekable<IntoIter<Token>>;

/// Builds one template tree from tokens.
pub struct Parser<'a> {
    file: &'a str,
    source: &'a str,
    stack: Vec<Tag>,
    root: Vec<Node>,
}

impl<'a> Parser<'a> {
    /// Creates a parser; `source` is only used for error snippets.
    pub fn new(file: &'a str, source: &'a str) -> Self {
        Self {
            file,
            source,
            stack: Vec::new(),
            root: Vec::new(),
        }
    }

    /// Parses tokens into a [`Node::Template`] root.
    pub fn parse(mut self, tokens: Vec<Token>) -> Result<Node> {
        let mut tokens = tokens.into_iter().peekable();

        while let Some(token) = tokens.next() {
            match token.kind.clone() {
                TokenKind::TagOpen(name) => self.open_tag(name, &token, &mut tokens)?,
                TokenKind::TagClose(name) => self.close_tag(&name, &token)?,
                TokenKind::Raw
                | TokenKind::Echo { .. }
                | TokenKind::Directive { .. }
                | TokenKind::Inline { .. }
                | TokenKind::Host(_) => {
                    let node = self.content_node(token)?;
                    self.append(node);
                }
                _ => return Err(self.error(&token, format!("unexpected `{}`", token.text))),
            }
        }

        if let Some(open) = self.stack.last() {
            let line = open.context.line;
            return Err(self.error_at(line, format!("unclosed tag <{}>", open.name)));
        }

        Ok(Node::Template {
            children: self.root,
            context: Context::new(self.file, 1, Grammar::Html, "template"),
        })
    }

    fn context(&self, token: &Token, label: impl Into<String>) -> Context {
        Context::new(self.file, token.line, token.grammar, label)
    }

    fn error(&self, token: &Token, message: String) -> StratumError {
        self.error_at(token.line, message)
    }

    fn error_at(&self, line: usize, message: String) -> StratumError {
        StratumError::ParseError {
            message,
            file: self.file.to_string(),
            line,
            source_context: Some(SourceContext::from_source(self.source, line, 1)),
        }
    }

    fn append(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(open) => open.children.push(node),
            None => self.root.push(node),
        }
    }

    /// Converts a raw, dynamic, inline or host token into a node.
    fn content_node(&self, token: Token) -> Result<Node> {
        let node = match token.kind.clone() {
            TokenKind::Raw => {
                let context = self.context(&token, "raw");
                Node::Raw(Raw {
                    content: token.text,
                    context,
                })
            }
            TokenKind::Echo { expr, escape } => Node::Echo(Echo {
                expr,
                escape,
                context: self.context(&token, if escape { "{{" } else { "{!!" }),
            }),
            TokenKind::Directive { name, body } => {
                let values = match &body {
                    Some(body) => split_values(body).map_err(|message| {
                        self.error(&token, format!("malformed arguments for @{}: {}", name, message))
                    })?,
                    None => Vec::new(),
                };
                Node::Directive(Directive {
                    context: self.context(&token, format!("@{}", name)),
                    name,
                    values,
                    body,
                })
            }
            TokenKind::Inline { name, default } => {
                let context = self.context(&token, format!("${{{}}}", name));
                let children = default
                    .map(|content| {
                        vec![Node::Raw(Raw {
                            content,
                            context: context.clone(),
                        })]
                    })
                    .unwrap_or_default();
                Node::Block(Block {
                    name,
                    children,
                    context,
                })
            }
            TokenKind::Host(code) => Node::HostCode(HostCode {
                code,
                context: self.context(&token, "<?lua"),
            }),
            _ => return Err(self.error(&token, format!("unexpected `{}`", token.text))),
        };
        Ok(node)
    }

    fn open_tag(&mut self, name: String, open: &Token, tokens: &mut Tokens) -> Result<()> {
        let mut attrs = Vec::new();

        let closing = loop {
            let Some(token) = tokens.next() else {
                return Err(self.error(open, format!("unterminated tag <{}>", name)));
            };
            match token.kind.clone() {
                TokenKind::AttrName(attr) => {
                    let value = self.attr_value(&token, tokens)?;
                    attrs.push(Attr {
                        name: attr,
                        value,
                        context: self.context(&token, "attr"),
                    });
                }
                TokenKind::Echo { .. } | TokenKind::Directive { .. } | TokenKind::Host(_) => {
                    let context = self.context(&token, "attr");
                    let node = self.content_node(token)?;
                    attrs.push(Attr {
                        name: String::new(),
                        value: AttrValue::Dynamic(vec![node]),
                        context,
                    });
                }
                TokenKind::TagEnd if is_void_element(&name) => break Closing::Void,
                TokenKind::TagEnd => break Closing::Pair,
                TokenKind::TagSelfClose => break Closing::SelfClosing,
                _ => {
                    return Err(self.error(&token, format!("unexpected `{}` in tag <{}>", token.text, name)));
                }
            }
        };

        let tag = Tag {
            context: self.context(open, name.clone()),
            name,
            attrs,
            children: Vec::new(),
            closing,
        };

        match closing {
            Closing::Pair => self.stack.push(tag),
            Closing::SelfClosing | Closing::Void => self.append(Node::Tag(tag)),
        }
        Ok(())
    }

    fn attr_value(&self, name: &Token, tokens: &mut Tokens) -> Result<AttrValue> {
        match tokens.peek().map(|t| t.kind.clone()) {
            Some(TokenKind::AttrUnquoted(value)) => {
                tokens.next();
                Ok(AttrValue::Unquoted(value))
            }
            Some(TokenKind::AttrValueStart(quote)) => {
                tokens.next();
                let mut nodes = Vec::new();
                loop {
                    let Some(token) = tokens.next() else {
                        return Err(self.error(name, "unterminated attribute value".to_string()));
                    };
                    match token.kind {
                        TokenKind::AttrValueEnd => break,
                        TokenKind::Raw
                        | TokenKind::Echo { .. }
                        | TokenKind::Directive { .. }
                        | TokenKind::Inline { .. }
                        | TokenKind::Host(_) => nodes.push(self.content_node(token)?),
                        _ => {
                            return Err(self.error(&token, format!("unexpected `{}` in attribute value", token.text)));
                        }
                    }
                }
                Ok(AttrValue::Quoted { quote, nodes })
            }
            _ => Ok(AttrValue::Bare),
        }
    }

    fn close_tag(&mut self, name: &str, token: &Token) -> Result<()> {
        let expected = self.stack.last().map(|open| open.name.clone());
        match expected {
            Some(open) if open.eq_ignore_ascii_case(name) => {
                if let Some(tag) = self.stack.pop() {
                    self.append(Node::Tag(tag));
                }
                Ok(())
            }
            _ if is_void_element(name) => Ok(()),
            Some(open) => Err(self.error(
                token,
                format!("unexpected closing tag </{}>, expected </{}>", name, open),
            )),
            None => Err(self.error(token, format!("unexpected closing tag </{}>", name))),
        }
    }
}

/// Tokenizes and parses one template file.
pub fn parse_template(source: &str, file: &str) -> Result<Node> {
    let tokens = tokenize(source, file)?;
    Parser::new(file, source).parse(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn children(node: &Node) -> &Vec<Node> {
        node.children().unwrap()
    }

    #[test]
    fn test_nested_elements() {
        let root = parse_template("<div><p>hi</p><br></div>", "t.stm").unwrap();
        let Node::Tag(div) = &children(&root)[0] else { panic!("expected div") };
        assert_eq!(div.name, "div");
        assert_eq!(div.children.len(), 2);
        let Node::Tag(br) = &div.children[1] else { panic!("expected br") };
        assert_eq!(br.closing, Closing::Void);
    }

    #[test]
    fn test_attributes_keep_dynamic_values() {
        let root = parse_template(r#"<a href="/u/{{ id }}" {{ extra }}>x</a>"#, "t.stm").unwrap();
        let Node::Tag(a) = &children(&root)[0] else { panic!("expected a") };
        let AttrValue::Quoted { nodes, quote } = &a.attrs[0].value else { panic!("expected quoted") };
        assert_eq!(*quote, '"');
        assert!(matches!(nodes[1], Node::Echo(_)));
        assert_eq!(a.attrs[1].name, "");
        assert!(matches!(a.attrs[1].value, AttrValue::Dynamic(_)));
    }

    #[test]
    fn test_directive_values_are_split() {
        let root = parse_template("@inject(router, 'app.router')", "t.stm").unwrap();
        let Node::Directive(d) = &children(&root)[0] else { panic!("expected directive") };
        assert_eq!(d.name, "inject");
        assert_eq!(d.values, vec!["router".to_string(), "'app.router'".to_string()]);
        assert_eq!(d.body.as_deref(), Some("router, 'app.router'"));
        assert_eq!(d.context.grammar, Grammar::Dynamic);
    }

    #[test]
    fn test_inline_block_becomes_block() {
        let root = parse_template("<h1>${title|Welcome}</h1>", "t.stm").unwrap();
        let Node::Tag(h1) = &children(&root)[0] else { panic!("expected h1") };
        let Node::Block(block) = &h1.children[0] else { panic!("expected block") };
        assert_eq!(block.name, "title");
        assert_eq!(block.context.grammar, Grammar::Inline);
        assert!(matches!(&block.children[0], Node::Raw(r) if r.content == "Welcome"));
    }

    #[test]
    fn test_mismatched_close_reports_line() {
        let err = parse_template("<div>\n<span>\n</div>", "bad.stm").unwrap_err();
        match err {
            StratumError::ParseError { file, line, message, .. } => {
                assert_eq!(file, "bad.stm");
                assert_eq!(line, 3);
                assert!(message.contains("expected </span>"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unclosed_tag_reports_open_line() {
        let err = parse_template("text\n<section>\nbody", "bad.stm").unwrap_err();
        assert!(matches!(err, StratumError::ParseError { line: 2, .. }));
    }

    #[test]
    fn test_stray_void_close_is_ignored() {
        assert!(parse_template("a<br></br>b", "t.stm").is_ok());
    }

    #[test]
    fn test_malformed_directive_arguments() {
        let err = parse_template("\n@json({a = 1)", "bad.stm").unwrap_err();
        assert!(matches!(err, StratumError::ParseError { line: 2, .. }));
    }
}
