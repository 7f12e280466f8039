// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use super::{Compiler, Output, Renderer};
use crate::ast::{Attr, AttrValue, Closing, Node};
use crate::error::{Result, StratumError};

/// Structural nodes: the template root, blocks and stacks render their children.
#[derive(Debug, Default)]
pub struct CoreRenderer;

impl Renderer for CoreRenderer {
    fn render(&self, compiler: &Compiler, out: &mut Output, node: &Node) -> Result<bool> {
        match node {
            Node::Template { children, .. } => compiler.render_all(out, children)?,
            Node::Block(block) => compiler.render_all(out, &block.children)?,
            Node::Stack(stack) => compiler.render_all(out, &stack.children)?,
            Node::Push(_) => {}
            Node::Import(import) => {
                return Err(StratumError::MergeError {
                    message: format!("unresolved import `{}`", import.path),
                    file: import.context.path.clone(),
                    line: import.context.line,
                });
            }
            Node::Directive(directive) => {
                return Err(StratumError::DirectiveError {
                    message: format!("@{}: directive was not expanded", directive.name),
                    file: directive.context.path.clone(),
                    line: directive.context.line,
                });
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Literal text and elements.
#[derive(Debug, Default)]
pub struct HtmlRenderer;

impl HtmlRenderer {
    fn attr(compiler: &Compiler, out: &mut Output, attr: &Attr) -> Result<()> {
        match &attr.value {
            AttrValue::Bare => out.text(&format!(" {}", attr.name), &attr.context),
            AttrValue::Unquoted(value) => out.text(&format!(" {}={}", attr.name, value), &attr.context),
            AttrValue::Quoted { quote, nodes } => {
                out.text(&format!(" {}={}", attr.name, quote), &attr.context);
                compiler.render_all(out, nodes)?;
                out.text(&quote.to_string(), &attr.context);
            }
            AttrValue::Dynamic(nodes) => {
                out.text(" ", &attr.context);
                compiler.render_all(out, nodes)?;
            }
        }
        Ok(())
    }
}

impl Renderer for HtmlRenderer {
    fn render(&self, compiler: &Compiler, out: &mut Output, node: &Node) -> Result<bool> {
        match node {
            Node::Raw(raw) => out.text(&raw.content, &raw.context),
            Node::Tag(tag) => {
                out.text(&format!("<{}", tag.name), &tag.context);
                for attr in &tag.attrs {
                    Self::attr(compiler, out, attr)?;
                }
                match tag.closing {
                    Closing::SelfClosing => out.text("/>", &tag.context),
                    Closing::Void => out.text(">", &tag.context),
                    Closing::Pair => {
                        out.text(">", &tag.context);
                        compiler.render_all(out, &tag.children)?;
                        out.text(&format!("</{}>", tag.name), &tag.context);
                    }
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Host code, including expanded directives and echoes.
#[derive(Debug, Default)]
pub struct HostRenderer;

impl Renderer for HostRenderer {
    fn render(&self, _compiler: &Compiler, out: &mut Output, node: &Node) -> Result<bool> {
        match node {
            Node::HostCode(host) => {
                out.code(&host.code, &host.context);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
