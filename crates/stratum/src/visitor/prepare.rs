// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Prepare stage: turns marker elements into structural nodes.

use super::{Action, Visitor, VisitorContext};
use crate::ast::{Attr, AttrValue, Block, Context, Node, Push, Stack, Tag};
use crate::error::{Result, StratumError};

fn syntax_error(context: &Context, message: String) -> StratumError {
    StratumError::ParseError {
        message,
        file: context.path.clone(),
        line: context.line,
        source_context: None,
    }
}

/// Moves `<attr:name>` children onto their parent element as attributes.
#[derive(Debug, Default)]
pub struct DefineAttributes;

impl Visitor for DefineAttributes {
    fn enter(&mut self, node: &mut Node, _ctx: &mut VisitorContext<'_>) -> Result<Action> {
        let Node::Tag(tag) = node else {
            return Ok(Action::Continue);
        };
        if !tag.children.iter().any(is_attr_tag) {
            return Ok(Action::Continue);
        }

        let children = std::mem::take(&mut tag.children);
        for child in children {
            match child {
                Node::Tag(attr) if attr.suffix("attr").is_some() => {
                    let name = attr.suffix("attr").unwrap_or_default().to_string();
                    if name.is_empty() {
                        return Err(syntax_error(&attr.context, "attribute name is missing".to_string()));
                    }
                    tag.attrs.push(Attr {
                        name,
                        value: AttrValue::Quoted {
                            quote: '"',
                            nodes: attr.children,
                        },
                        context: attr.context,
                    });
                }
                other => tag.children.push(other),
            }
        }
        Ok(Action::Continue)
    }
}

fn is_attr_tag(node: &Node) -> bool {
    matches!(node, Node::Tag(tag) if tag.suffix("attr").is_some())
}

/// Turns `<block:name>` elements into [`Block`] nodes.
#[derive(Debug, Default)]
pub struct DefineBlocks;

impl Visitor for DefineBlocks {
    fn enter(&mut self, node: &mut Node, _ctx: &mut VisitorContext<'_>) -> Result<Action> {
        let Node::Tag(tag) = node else {
            return Ok(Action::Continue);
        };
        let Some(name) = tag.suffix("block") else {
            return Ok(Action::Continue);
        };
        if name.is_empty() {
            return Err(syntax_error(&tag.context, "block name is missing".to_string()));
        }

        *node = Node::Block(Block {
            name: name.to_string(),
            children: std::mem::take(&mut tag.children),
            context: tag.context.clone(),
        });
        Ok(Action::Continue)
    }
}

/// Drops `<hidden>` elements with their content.
#[derive(Debug, Default)]
pub struct DefineHidden;

impl Visitor for DefineHidden {
    fn enter(&mut self, node: &mut Node, _ctx: &mut VisitorContext<'_>) -> Result<Action> {
        match node {
            Node::Tag(tag) if tag.name == "hidden" => Ok(Action::Remove),
            _ => Ok(Action::Continue),
        }
    }
}

/// Turns `<stack:collect>`, `<stack:push>` and `<stack:prepend>` into stack nodes.
#[derive(Debug, Default)]
pub struct DefineStacks;

impl DefineStacks {
    fn stack_name(tag: &Tag) -> Result<String> {
        match tag.static_attr("name") {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(syntax_error(
                &tag.context,
                format!("<{}> requires a literal name attribute", tag.name),
            )),
        }
    }
}

impl Visitor for DefineStacks {
    fn enter(&mut self, node: &mut Node, _ctx: &mut VisitorContext<'_>) -> Result<Action> {
        let Node::Tag(tag) = node else {
            return Ok(Action::Continue);
        };
        let Some(operation) = tag.suffix("stack").map(str::to_string) else {
            return Ok(Action::Continue);
        };

        let name = Self::stack_name(tag)?;
        let children = std::mem::take(&mut tag.children);
        let context = tag.context.clone();
        *node = match operation.as_str() {
            "collect" => Node::Stack(Stack {
                name,
                children,
                context,
            }),
            "push" | "prepend" => Node::Push(Push {
                name,
                prepend: operation == "prepend",
                children,
                context,
            }),
            other => return Err(syntax_error(&context, format!("unknown stack operation `{}`", other))),
        };
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
    use crate::visitor::traverse;
    use std::sync::Arc;

    fn prepare(source: &str) -> Result<Node> {
        let builder = Builder::new(Arc::new(MemoryLoader::new()));
        let mut session = Session::new(RenderContext::default());
        let mut root = parse_template(source, "t.stm")?;
        let mut visitors: Vec<Box<dyn Visitor>> = vec![
            Box::new(DefineAttributes),
            Box::new(DefineBlocks),
            Box::new(DefineHidden),
            Box::new(DefineStacks),
        ];
        let mut ctx = VisitorContext::new(&builder, &mut session);
        traverse(&mut visitors, &mut root, &mut ctx)?;
        Ok(root)
    }

    #[test]
    fn test_attr_children_become_attributes() {
        let root = prepare(r#"<a href="/"><attr:title>Go {{ name }}</attr:title>x</a>"#).unwrap();
        let Node::Tag(a) = &root.children().unwrap()[0] else { panic!("expected a") };
        assert_eq!(a.attrs.len(), 2);
        assert_eq!(a.attrs[1].name, "title");
        assert_eq!(a.children.len(), 1);
    }

    #[test]
    fn test_blocks_and_hidden() {
        let root = prepare("<block:body>x<hidden>secret</hidden></block:body>").unwrap();
        let Node::Block(block) = &root.children().unwrap()[0] else { panic!("expected block") };
        assert_eq!(block.name, "body");
        assert_eq!(block.children.len(), 1);
    }

    #[test]
    fn test_stacks() {
        let root = prepare(
            r#"<stack:collect name="js"/><stack:prepend name="js">a</stack:prepend><stack:push name="js">b</stack:push>"#,
        )
        .unwrap();
        let children = root.children().unwrap();
        assert!(matches!(&children[0], Node::Stack(s) if s.name == "js"));
        assert!(matches!(&children[1], Node::Push(p) if p.prepend));
        assert!(matches!(&children[2], Node::Push(p) if !p.prepend));
    }

    #[test]
    fn test_stack_without_name_fails() {
        let err = prepare("\n<stack:push>x</stack:push>").unwrap_err();
        assert!(matches!(err, StratumError::ParseError { line: 2, .. }));
    }
}
