// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Finalize stage: stacks, directive expansion and whitespace.

use super::{Action, PreservePredicate, Scope, Visitor, VisitorContext};
use crate::ast::{Context, Directive, HostCode, Node, Push, Raw};
use crate::directive::DirectiveRegistry;
use crate::error::{Result, StratumError};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref LINE_BREAKS: Regex = Regex::new(r"[\r\n]+").expect("valid line break pattern");
}

/// Gathers stack contributions and fills the collection points at the end of the document.
///
/// Prepended contributions go before the stack's own content, the most
/// recent first. Appended contributions follow it in document order.
/// Contributions to a stack that is never collected are dropped.
#[derive(Debug, Default)]
pub struct StackCollector {
    pushes: Vec<Push>,
}

impl StackCollector {
    fn fill(&self, nodes: &mut [Node]) {
        for node in nodes.iter_mut() {
            if let Node::Stack(stack) = node {
                let mut filled: Vec<Node> = self
                    .pushes
                    .iter()
                    .rev()
                    .filter(|push| push.prepend && push.name == stack.name)
                    .flat_map(|push| push.children.iter().cloned())
                    .collect();
                filled.append(&mut stack.children);
                filled.extend(
                    self.pushes
                        .iter()
                        .filter(|push| !push.prepend && push.name == stack.name)
                        .flat_map(|push| push.children.iter().cloned()),
                );
                stack.children = filled;
                continue;
            }
            if let Some(children) = node.children_mut() {
                self.fill(children);
            }
        }
    }
}

impl Visitor for StackCollector {
    fn leave(&mut self, node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<Action> {
        match node {
            Node::Push(push) => {
                self.pushes.push(Push {
                    name: push.name.clone(),
                    prepend: push.prepend,
                    children: std::mem::take(&mut push.children),
                    context: push.context.clone(),
                });
                Ok(Action::Remove)
            }
            Node::Template { children, .. } if ctx.depth() == 0 => {
                self.fill(children);
                Ok(Action::Continue)
            }
            _ => Ok(Action::Continue),
        }
    }
}

/// Expands directives and echoes into host code.
pub struct ExpandDirectives {
    registry: Arc<DirectiveRegistry>,
}

impl ExpandDirectives {
    /// Creates the visitor over `registry`.
    pub fn new(registry: Arc<DirectiveRegistry>) -> Self {
        Self { registry }
    }
}

fn host(code: String, context: &Context) -> Node {
    Node::HostCode(HostCode {
        code,
        context: context.clone(),
    })
}

/// Restores an unregistered `@name(...)` as the text it was lexed from.
fn verbatim(directive: &Directive) -> Node {
    let mut content = format!("@{}", directive.name);
    if let Some(body) = &directive.body {
        content.push('(');
        content.push_str(body);
        content.push(')');
    }
    Node::Raw(Raw {
        content,
        context: directive.context.clone(),
    })
}

fn in_style(scopes: &[Scope]) -> bool {
    scopes
        .iter()
        .any(|scope| matches!(scope, Scope::Tag(name) if name.eq_ignore_ascii_case("style")))
}

impl Visitor for ExpandDirectives {
    fn leave(&mut self, node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<Action> {
        match node {
            // CSS at-rules such as `@media` share the directive syntax.
            Node::Directive(directive) if !self.registry.contains(&directive.name) && in_style(ctx.scopes()) => {
                *node = verbatim(directive);
            }
            Node::Directive(directive) => {
                let code = self.registry.render(directive)?;
                *node = host(code, &directive.context);
            }
            Node::Echo(echo) => {
                let expr = echo.expr.trim();
                if expr.is_empty() {
                    return Err(StratumError::ParseError {
                        message: "empty echo expression".to_string(),
                        file: echo.context.path.clone(),
                        line: echo.context.line,
                        source_context: None,
                    });
                }
                let code = if echo.escape {
                    format!("__write(__escape({}))", expr)
                } else {
                    format!("__write(__tostring({}))", expr)
                };
                *node = host(code, &echo.context);
            }
            _ => {}
        }
        Ok(Action::Continue)
    }
}

/// Collapses runs of line breaks in literal text and trims the document edges.
pub struct TrimLines {
    preserve: PreservePredicate,
}

impl TrimLines {
    /// Creates the visitor; text inside scopes matching `preserve` is left untouched.
    pub fn new(preserve: PreservePredicate) -> Self {
        Self { preserve }
    }
}

fn trim_edges(children: &mut Vec<Node>) {
    if let Some(Node::Raw(raw)) = children.first_mut() {
        raw.content = raw.content.trim_start().to_string();
    }
    if let Some(Node::Raw(raw)) = children.last_mut() {
        raw.content = raw.content.trim_end().to_string();
    }
    children.retain(|node| !matches!(node, Node::Raw(raw) if raw.content.is_empty()));
}

impl Visitor for TrimLines {
    fn leave(&mut self, node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<Action> {
        match node {
            Node::Raw(raw) if !(self.preserve)(ctx.scopes()) => {
                if LINE_BREAKS.is_match(&raw.content) {
                    raw.content = LINE_BREAKS.replace_all(&raw.content, "\n").into_owned();
                }
            }
            Node::Template { children, .. } if ctx.depth() == 0 => trim_edges(children),
            _ => {}
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Session};
    use crate::context::RenderContext;
    use crate::loader::MemoryLoader;
    use crate::parser::parse_template;
    use crate::visitor::{preserve_in, traverse};

    fn finalize(source: &str) -> Result<Node> {
        let builder = Builder::new(Arc::new(MemoryLoader::new()));
        let mut session = Session::new(RenderContext::default());
        let mut root = parse_template(source, "t.stm")?;
        let mut prepare: Vec<Box<dyn Visitor>> = vec![Box::new(crate::visitor::prepare::DefineStacks)];
        let mut visitors: Vec<Box<dyn Visitor>> = vec![
            Box::new(StackCollector::default()),
            Box::new(ExpandDirectives::new(Arc::new(DirectiveRegistry::builtin()))),
            Box::new(TrimLines::new(preserve_in(vec!["pre".into()]))),
        ];
        let mut ctx = VisitorContext::new(&builder, &mut session);
        traverse(&mut prepare, &mut root, &mut ctx)?;
        traverse(&mut visitors, &mut root, &mut ctx)?;
        Ok(root)
    }

    fn raw_text(node: &Node) -> String {
        let mut out = String::new();
        for child in node.children().unwrap() {
            match child {
                Node::Raw(raw) => out.push_str(&raw.content),
                other => {
                    if let Some(inner) = other.children() {
                        for n in inner {
                            if let Node::Raw(raw) = n {
                                out.push_str(&raw.content);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn test_stack_order() {
        let root = finalize(
            r#"<stack:collect name="js">[own]</stack:collect><stack:push name="js">a</stack:push><stack:prepend name="js">p1</stack:prepend><stack:push name="js">b</stack:push><stack:prepend name="js">p2</stack:prepend><stack:push name="css">x</stack:push>"#,
        )
        .unwrap();
        assert_eq!(root.children().unwrap().len(), 1);
        assert_eq!(raw_text(&root), "p2p1[own]ab");
    }

    #[test]
    fn test_echo_and_directive_become_host_code() {
        let root = finalize("{{ name }}{!! html !!}@if(x)").unwrap();
        let codes: Vec<String> = root
            .children()
            .unwrap()
            .iter()
            .map(|node| match node {
                Node::HostCode(code) => code.code.clone(),
                other => panic!("unexpected {}", other.kind()),
            })
            .collect();
        assert_eq!(
            codes,
            vec!["__write(__escape(name))", "__write(__tostring(html))", "if x then"]
        );
    }

    #[test]
    fn test_unknown_directive_reports_location() {
        let err = finalize("\n\n@nope(1)").unwrap_err();
        match err {
            StratumError::DirectiveError { file, line, .. } => {
                assert_eq!(file, "t.stm");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_line_breaks_collapse_outside_preserved_scopes() {
        let root = finalize("\n\n<div>\n\n\n  hello\r\n\n</div><pre>a\n\n\nb</pre>\n").unwrap();
        let children = root.children().unwrap();
        let Node::Tag(div) = &children[0] else { panic!("expected div") };
        assert!(matches!(&div.children[0], Node::Raw(r) if r.content == "\n  hello\n"));
        let Node::Tag(pre) = &children[1] else { panic!("expected pre") };
        assert!(matches!(&pre.children[0], Node::Raw(r) if r.content == "a\n\n\nb"));
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_css_at_rules_pass_through_style_bodies() {
        let root = finalize("<style>@media print { p { margin: 0 } } @supports(display: grid) {}</style>").unwrap();
        assert_eq!(raw_text(&root), "@media print { p { margin: 0 } } @supports(display: grid) {}");
        assert!(finalize("<div>@media print</div>").is_err());
    }
}
