// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree types for Stratum templates.
//!
//! A template parses into a single [`Node::Template`] root that owns its
//! children. Every node carries a [`Context`] describing where it came from:
//! the template file, the line, the grammar that produced it and, when the
//! node was pulled into another template by `extends` or an import, the
//! context of the tag that pulled it in.

use crate::lexer::Grammar;
use serde::{Deserialize, Serialize};

/// Source location of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Template file the node was read from.
    pub path: String,
    /// 1-based line in `path`.
    pub line: usize,
    /// Grammar that produced the node.
    pub grammar: Grammar,
    /// Short symbolic label (tag name, `@directive`, `{{`, ...).
    pub label: String,
    /// Context of the `extends`/import tag that merged this node into another template.
    pub parent: Option<Box<Context>>,
}

impl Context {
    /// Creates a context with no origin chain.
    pub fn new(path: impl Into<String>, line: usize, grammar: Grammar, label: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            grammar,
            label: label.into(),
            parent: None,
        }
    }

    /// Appends `origin` at the end of this context's origin chain.
    pub fn attach(&mut self, origin: &Context) {
        match &mut self.parent {
            Some(parent) => parent.attach(origin),
            None => self.parent = Some(Box::new(origin.clone())),
        }
    }
}

/// Literal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raw {
    /// The text, emitted verbatim.
    pub content: String,
    /// Source location.
    pub context: Context,
}

/// How an element was terminated in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Closing {
    /// `<tag>...</tag>`
    Pair,
    /// `<tag/>`
    SelfClosing,
    /// Void HTML element such as `<br>`.
    Void,
}

/// Value of an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Attribute without value (`<input disabled>`).
    Bare,
    /// Unquoted value (`width=10`).
    Unquoted(String),
    /// Quoted value; may embed dynamic nodes.
    Quoted {
        /// Quote character used in the source.
        quote: char,
        /// Value content.
        nodes: Vec<Node>,
    },
    /// Dynamic construct in attribute position (`<div {{ attrs }}>`).
    Dynamic(Vec<Node>),
}

impl AttrValue {
    /// Returns the value as plain text when it contains only literal content.
    pub fn as_static(&self) -> Option<String> {
        match self {
            AttrValue::Bare => Some(String::new()),
            AttrValue::Unquoted(value) => Some(value.clone()),
            AttrValue::Quoted { nodes, .. } => {
                let mut out = String::new();
                for node in nodes {
                    match node {
                        Node::Raw(raw) => out.push_str(&raw.content),
                        _ => return None,
                    }
                }
                Some(out)
            }
            AttrValue::Dynamic(_) => None,
        }
    }

    /// Converts the value into content nodes, as used when an attribute fills a block.
    pub fn into_nodes(self, context: &Context) -> Vec<Node> {
        match self {
            AttrValue::Bare => Vec::new(),
            AttrValue::Unquoted(value) => vec![Node::Raw(Raw {
                content: value,
                context: context.clone(),
            })],
            AttrValue::Quoted { nodes, .. } | AttrValue::Dynamic(nodes) => nodes,
        }
    }
}

/// Element attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attr {
    /// Attribute name; empty for [`AttrValue::Dynamic`].
    pub name: String,
    /// Attribute value.
    pub value: AttrValue,
    /// Source location.
    pub context: Context,
}

/// Structural HTML-like element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Element name as written.
    pub name: String,
    /// Attributes in source order.
    pub attrs: Vec<Attr>,
    /// Child nodes.
    pub children: Vec<Node>,
    /// Source termination form.
    pub closing: Closing,
    /// Source location.
    pub context: Context,
}

impl Tag {
    /// Finds an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Returns the literal value of an attribute.
    pub fn static_attr(&self, name: &str) -> Option<String> {
        self.attr(name).and_then(|a| a.value.as_static())
    }

    /// Returns the part of the name after `prefix:`, if the name carries that prefix.
    pub fn suffix(&self, prefix: &str) -> Option<&str> {
        self.name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

/// Named directive call (`@name(values)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    /// Directive name without `@`.
    pub name: String,
    /// Positional argument values, trimmed.
    pub values: Vec<String>,
    /// Raw text between the parentheses, if any.
    pub body: Option<String>,
    /// Source location.
    pub context: Context,
}

/// Inline expression echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    /// Host-language expression.
    pub expr: String,
    /// Whether output is HTML-escaped (`{{ }}`) or raw (`{!! !!}`).
    pub escape: bool,
    /// Source location.
    pub context: Context,
}

/// Host-language code passed through verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostCode {
    /// The code.
    pub code: String,
    /// Source location.
    pub context: Context,
}

/// Named override slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Slot name.
    pub name: String,
    /// Default (or overriding) content.
    pub children: Vec<Node>,
    /// Source location.
    pub context: Context,
}

/// Named, appendable content region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    /// Stack name.
    pub name: String,
    /// Default content, followed by collected pushes after finalize.
    pub children: Vec<Node>,
    /// Source location.
    pub context: Context,
}

/// Contribution to a named stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    /// Target stack name.
    pub name: String,
    /// Insert before earlier contributions instead of after.
    pub prepend: bool,
    /// Contributed content.
    pub children: Vec<Node>,
    /// Source location.
    pub context: Context,
}

/// Reference to another template spliced in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    /// Template identifier of the fragment.
    pub path: String,
    /// Attributes filling blocks of the fragment.
    pub attrs: Vec<Attr>,
    /// Content filling blocks of the fragment.
    pub children: Vec<Node>,
    /// Source location.
    pub context: Context,
}

/// Template AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Root of a template file.
    Template {
        /// Top-level nodes.
        children: Vec<Node>,
        /// Location of the file start.
        context: Context,
    },
    /// Literal text.
    Raw(Raw),
    /// Element.
    Tag(Tag),
    /// Directive call.
    Directive(Directive),
    /// Inline expression.
    Echo(Echo),
    /// Host code.
    HostCode(HostCode),
    /// Block slot.
    Block(Block),
    /// Stack collection point.
    Stack(Stack),
    /// Stack contribution.
    Push(Push),
    /// Fragment reference.
    Import(Import),
}

impl Node {
    /// Source location of the node.
    pub fn context(&self) -> &Context {
        match self {
            Node::Template { context, .. } => context,
            Node::Raw(n) => &n.context,
            Node::Tag(n) => &n.context,
            Node::Directive(n) => &n.context,
            Node::Echo(n) => &n.context,
            Node::HostCode(n) => &n.context,
            Node::Block(n) => &n.context,
            Node::Stack(n) => &n.context,
            Node::Push(n) => &n.context,
            Node::Import(n) => &n.context,
        }
    }

    fn context_mut(&mut self) -> &mut Context {
        match self {
            Node::Template { context, .. } => context,
            Node::Raw(n) => &mut n.context,
            Node::Tag(n) => &mut n.context,
            Node::Directive(n) => &mut n.context,
            Node::Echo(n) => &mut n.context,
            Node::HostCode(n) => &mut n.context,
            Node::Block(n) => &mut n.context,
            Node::Stack(n) => &mut n.context,
            Node::Push(n) => &mut n.context,
            Node::Import(n) => &mut n.context,
        }
    }

    /// Child nodes, if the variant has any.
    pub fn children(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Template { children, .. } => Some(children),
            Node::Tag(n) => Some(&n.children),
            Node::Block(n) => Some(&n.children),
            Node::Stack(n) => Some(&n.children),
            Node::Push(n) => Some(&n.children),
            Node::Import(n) => Some(&n.children),
            Node::Raw(_) | Node::Directive(_) | Node::Echo(_) | Node::HostCode(_) => None,
        }
    }

    /// Mutable child nodes, if the variant has any.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Template { children, .. } => Some(children),
            Node::Tag(n) => Some(&mut n.children),
            Node::Block(n) => Some(&mut n.children),
            Node::Stack(n) => Some(&mut n.children),
            Node::Push(n) => Some(&mut n.children),
            Node::Import(n) => Some(&mut n.children),
            Node::Raw(_) | Node::Directive(_) | Node::Echo(_) | Node::HostCode(_) => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Template { .. } => "template",
            Node::Raw(_) => "raw",
            Node::Tag(_) => "tag",
            Node::Directive(_) => "directive",
            Node::Echo(_) => "echo",
            Node::HostCode(_) => "host",
            Node::Block(_) => "block",
            Node::Stack(_) => "stack",
            Node::Push(_) => "push",
            Node::Import(_) => "import",
        }
    }

    /// Attaches `origin` to the origin chain of this node and its whole subtree,
    /// attribute values included.
    pub fn attach_origin(&mut self, origin: &Context) {
        self.context_mut().attach(origin);
        if let Node::Tag(tag) = self {
            for attr in &mut tag.attrs {
                attr.attach_origin(origin);
            }
        }
        if let Node::Import(import) = self {
            for attr in &mut import.attrs {
                attr.attach_origin(origin);
            }
        }
        if let Some(children) = self.children_mut() {
            for child in children {
                child.attach_origin(origin);
            }
        }
    }
}

impl Attr {
    fn attach_origin(&mut self, origin: &Context) {
        self.context.attach(origin);
        match &mut self.value {
            AttrValue::Quoted { nodes, .. } | AttrValue::Dynamic(nodes) => {
                for node in nodes {
                    node.attach_origin(origin);
                }
            }
            AttrValue::Bare | AttrValue::Unquoted(_) => {}
        }
    }
}

/// A parsed (and possibly merged) template.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    /// The [`Node::Template`] root.
    pub root: Node,
    /// Every file consulted to build the tree, in first-seen order.
    pub paths: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(path: &str, line: usize) -> Context {
        Context::new(path, line, Grammar::Html, "div")
    }

    #[test]
    fn test_context_attach_appends_to_chain() {
        let mut leaf = ctx("leaf.stm", 2);
        leaf.attach(&ctx("middle.stm", 3));
        leaf.attach(&ctx("root.stm", 7));

        let middle = leaf.parent.as_ref().unwrap();
        assert_eq!(middle.path, "middle.stm");
        assert_eq!(middle.parent.as_ref().unwrap().path, "root.stm");
        assert_eq!(middle.parent.as_ref().unwrap().line, 7);
    }

    #[test]
    fn test_attach_origin_reaches_attribute_values() {
        let mut node = Node::Tag(Tag {
            name: "a".into(),
            attrs: vec![Attr {
                name: "href".into(),
                value: AttrValue::Quoted {
                    quote: '"',
                    nodes: vec![Node::Raw(Raw {
                        content: "/".into(),
                        context: ctx("leaf.stm", 1),
                    })],
                },
                context: ctx("leaf.stm", 1),
            }],
            children: vec![],
            closing: Closing::Pair,
            context: ctx("leaf.stm", 1),
        });

        node.attach_origin(&ctx("page.stm", 4));

        let Node::Tag(tag) = &node else { panic!("expected tag") };
        let AttrValue::Quoted { nodes, .. } = &tag.attrs[0].value else { panic!("expected quoted") };
        assert_eq!(nodes[0].context().parent.as_ref().unwrap().path, "page.stm");
    }

    #[test]
    fn test_attr_value_as_static() {
        let c = ctx("t.stm", 1);
        assert_eq!(AttrValue::Bare.as_static(), Some(String::new()));
        assert_eq!(AttrValue::Unquoted("10".into()).as_static(), Some("10".into()));
        let dynamic = AttrValue::Quoted {
            quote: '"',
            nodes: vec![Node::Echo(Echo {
                expr: "x".into(),
                escape: true,
                context: c,
            })],
        };
        assert_eq!(dynamic.as_static(), None);
    }

    #[test]
    fn test_tag_suffix() {
        let tag = Tag {
            name: "block:title".into(),
            attrs: vec![],
            children: vec![],
            closing: Closing::Pair,
            context: ctx("t.stm", 1),
        };
        assert_eq!(tag.suffix("block"), Some("title"));
        assert_eq!(tag.suffix("stack"), None);
    }
}
