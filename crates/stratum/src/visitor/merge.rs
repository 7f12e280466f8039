// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Transform stage: splices imported fragments and merges parent layouts.
//!
//! Both merges work on [`Block`](crate::ast::Block) slots. An import fills the fragment's
//! blocks from the attributes and `<block:name>` children of the importing
//! element, with loose children going to the `content` block. An extends
//! fills the parent's blocks from the root-level blocks of the child
//! template and the attributes of the extends element. Inside a filling,
//! `${parent}` stands for the slot's default content.
//!
//! Every spliced node gets the referencing element's context attached to
//! its origin chain, so runtime failures can be traced back through the
//! reference.

use super::{Action, Visitor, VisitorContext};
use crate::ast::{Attr, AttrValue, Context, Import, Node, Tag};
use crate::error::{Result, StratumError};
use std::collections::BTreeMap;

/// Block receiving the loose children of an importing element.
pub const CONTENT_BLOCK: &str = "content";

/// Placeholder block standing for the default content of the slot being filled.
pub const PARENT_BLOCK: &str = "parent";

/// Converts a dotted element suffix (`partials.card`) into a view path.
pub fn suffix_path(suffix: &str) -> String {
    suffix.replace('.', "/")
}

fn merge_error(context: &Context, message: String) -> StratumError {
    StratumError::MergeError {
        message,
        file: context.path.clone(),
        line: context.line,
    }
}

/// Block fillings keyed by block name.
#[derive(Debug, Default)]
struct Fillings {
    blocks: BTreeMap<String, Vec<Node>>,
}

impl Fillings {
    fn from_attrs(&mut self, attrs: Vec<Attr>, skip: &[&str]) {
        for attr in attrs {
            if attr.name.is_empty() || skip.contains(&attr.name.as_str()) {
                continue;
            }
            let nodes = attr.value.into_nodes(&attr.context);
            self.blocks.insert(attr.name, nodes);
        }
    }

    fn insert(&mut self, name: String, nodes: Vec<Node>) {
        self.blocks.insert(name, nodes);
    }

    /// Replaces every matching block under `nodes`; returns the names used.
    fn apply(&self, nodes: &mut [Node], used: &mut Vec<String>) {
        for node in nodes.iter_mut() {
            if let Node::Block(block) = node {
                if let Some(filling) = self.blocks.get(&block.name) {
                    let default = std::mem::take(&mut block.children);
                    block.children = with_parent(filling.clone(), &default);
                    if !used.contains(&block.name) {
                        used.push(block.name.clone());
                    }
                    continue;
                }
            }
            if let Node::Tag(tag) = node {
                for attr in tag.attrs.iter_mut() {
                    if let Some(value) = attr_nodes(attr) {
                        self.apply(value, used);
                    }
                }
            }
            if let Some(children) = node.children_mut() {
                self.apply(children, used);
            }
        }
    }
}

fn attr_nodes(attr: &mut Attr) -> Option<&mut Vec<Node>> {
    match &mut attr.value {
        AttrValue::Quoted { nodes, .. } | AttrValue::Dynamic(nodes) => Some(nodes),
        _ => None,
    }
}

/// Substitutes `${parent}` placeholders in `filling` with `default`.
fn with_parent(filling: Vec<Node>, default: &[Node]) -> Vec<Node> {
    let mut out = Vec::with_capacity(filling.len());
    for mut node in filling {
        match &mut node {
            Node::Block(block) if block.name == PARENT_BLOCK => {
                out.extend(default.iter().cloned());
                continue;
            }
            _ => {}
        }
        if let Some(children) = node.children_mut() {
            let inner = std::mem::take(children);
            *children = with_parent(inner, default);
        }
        out.push(node);
    }
    out
}

fn has_content(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| match node {
        Node::Raw(raw) => !raw.content.trim().is_empty(),
        _ => true,
    })
}

/// Root children of a loaded template.
fn into_children(root: Node) -> Vec<Node> {
    match root {
        Node::Template { children, .. } => children,
        other => vec![other],
    }
}

/// Resolves `<use>` declarations, aliased elements and `<include:path>` elements.
#[derive(Debug, Default)]
pub struct ResolveImports {
    /// Declared aliases as (depth, alias, path).
    aliases: Vec<(usize, String, String)>,
}

impl ResolveImports {
    fn declare(&mut self, tag: &Tag, depth: usize) -> Result<()> {
        let path = tag
            .static_attr("path")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| merge_error(&tag.context, "<use> requires a literal path attribute".to_string()))?;
        let alias = match tag.static_attr("as") {
            Some(alias) if !alias.is_empty() => alias,
            _ => path
                .rsplit(['/', ':', '.'])
                .next()
                .unwrap_or(path.as_str())
                .to_string(),
        };
        self.aliases.push((depth, alias, path));
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        self.aliases
            .iter()
            .rev()
            .find(|(_, alias, _)| alias == name)
            .map(|(_, _, path)| path.as_str())
    }

    fn splice(import: Import, fragment: Node) -> Vec<Node> {
        let mut fillings = Fillings::default();
        fillings.from_attrs(import.attrs, &[]);

        let mut loose = Vec::new();
        for child in import.children {
            match child {
                Node::Block(block) => fillings.insert(block.name, block.children),
                other => loose.push(other),
            }
        }
        if has_content(&loose) {
            fillings.insert(CONTENT_BLOCK.to_string(), loose);
        }

        let mut nodes = into_children(fragment);
        for node in nodes.iter_mut() {
            node.attach_origin(&import.context);
        }
        fillings.apply(&mut nodes, &mut Vec::new());
        nodes
    }
}

impl Visitor for ResolveImports {
    fn enter(&mut self, node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<Action> {
        let Node::Tag(tag) = node else {
            return Ok(Action::Continue);
        };

        if tag.name == "use" {
            self.declare(tag, ctx.depth())?;
            return Ok(Action::Remove);
        }

        let path = match tag.suffix("include") {
            Some(suffix) => Some(suffix_path(suffix)),
            None => self.lookup(&tag.name).map(str::to_string),
        };
        if let Some(path) = path {
            *node = Node::Import(Import {
                path,
                attrs: std::mem::take(&mut tag.attrs),
                children: std::mem::take(&mut tag.children),
                context: tag.context.clone(),
            });
        }
        Ok(Action::Continue)
    }

    fn leave(&mut self, node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<Action> {
        let depth = ctx.depth();
        self.aliases.retain(|(declared, _, _)| *declared <= depth);

        if !matches!(node, Node::Import(_)) {
            return Ok(Action::Continue);
        }
        let placeholder = Node::Template {
            children: Vec::new(),
            context: node.context().clone(),
        };
        let Node::Import(import) = std::mem::replace(node, placeholder) else {
            return Ok(Action::Continue);
        };
        let fragment = ctx.load_fragment(&import.path, &import.context)?;
        Ok(Action::Replace(Self::splice(import, fragment)))
    }
}

/// Merges a template into the parent named by its root-level extends element.
///
/// With `strict_blocks` enabled in the builder options, child blocks the
/// parent does not define are rejected.
#[derive(Debug, Default)]
pub struct ExtendsParent;

impl ExtendsParent {
    fn parent_path(tag: &Tag) -> Option<Result<String>> {
        if let Some(suffix) = tag.suffix("extends") {
            return Some(Ok(suffix_path(suffix)));
        }
        if tag.name != "extends" {
            return None;
        }
        Some(
            tag.static_attr("path")
                .filter(|p| !p.is_empty())
                .ok_or_else(|| merge_error(&tag.context, "<extends> requires a literal path attribute".to_string())),
        )
    }
}

/// Whether a child node would have produced output had it not been discarded.
fn is_content(node: &Node) -> bool {
    match node {
        Node::Raw(raw) => !raw.content.trim().is_empty(),
        _ => true,
    }
}

impl Visitor for ExtendsParent {
    fn leave(&mut self, node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<Action> {
        if ctx.depth() != 0 {
            return Ok(Action::Continue);
        }
        let Node::Template { children, .. } = node else {
            return Ok(Action::Continue);
        };

        let position = children.iter().position(|child| match child {
            Node::Tag(tag) => Self::parent_path(tag).is_some(),
            _ => false,
        });
        let Some(position) = position else {
            return Ok(Action::Continue);
        };
        let Node::Tag(extends) = children.remove(position) else {
            return Ok(Action::Continue);
        };
        let path = match Self::parent_path(&extends) {
            Some(path) => path?,
            None => return Ok(Action::Continue),
        };

        let parent = ctx.load(&path, &extends.context)?;

        let mut fillings = Fillings::default();
        fillings.from_attrs(extends.attrs.clone(), &["path"]);
        let mut leading = Vec::new();
        let mut trailing = Vec::new();
        for child in std::mem::take(children) {
            match child {
                Node::Block(block) => {
                    fillings.insert(block.name, block.children);
                }
                node @ (Node::Directive(_) | Node::HostCode(_)) => leading.push(node),
                node @ Node::Push(_) => trailing.push(node),
                node if is_content(&node) => {
                    let context = node.context();
                    tracing::warn!(
                        "{}:{}: {} outside of a block is ignored when extending `{}`",
                        context.path,
                        context.line,
                        node.kind(),
                        path
                    );
                }
                _ => {}
            }
        }

        let mut nodes = into_children(parent);
        for node in nodes.iter_mut() {
            node.attach_origin(&extends.context);
        }
        let mut used = Vec::new();
        fillings.apply(&mut nodes, &mut used);

        if ctx.builder().options().strict_blocks {
            let unknown: Vec<&String> = fillings.blocks.keys().filter(|name| !used.contains(name)).collect();
            if let Some(name) = unknown.first() {
                return Err(merge_error(
                    &extends.context,
                    format!("block `{}` is not defined by parent `{}`", name, path),
                ));
            }
        }

        *children = leading;
        children.extend(nodes);
        children.extend(trailing);
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{Builder, Session};
    use crate::context::RenderContext;
    use crate::loader::MemoryLoader;
    use std::sync::Arc;

    fn flatten(nodes: &[Node], out: &mut String) {
        for node in nodes {
            match node {
                Node::Raw(raw) => out.push_str(&raw.content),
                Node::Tag(tag) => {
                    out.push('<');
                    out.push_str(&tag.name);
                    out.push('>');
                    flatten(&tag.children, out);
                }
                other => {
                    if let Some(children) = other.children() {
                        flatten(children, out);
                    }
                }
            }
        }
    }

    fn load(loader: MemoryLoader, path: &str) -> Result<Node> {
        let builder = Builder::new(Arc::new(loader));
        let mut session = Session::new(RenderContext::default());
        builder.load(path, &mut session, None)
    }

    fn text(node: &Node) -> String {
        let mut out = String::new();
        flatten(node.children().unwrap(), &mut out);
        out
    }

    #[test]
    fn test_alias_import_fills_blocks() {
        let loader = MemoryLoader::new()
            .with("card", r#"<div class="${class|card}">${title}|${content}</div>"#)
            .with(
                "page",
                r#"<use path="card" as="card"/><card class="wide" title="T">body</card>"#,
            );
        let root = load(loader, "page").unwrap();
        assert_eq!(text(&root), "<div>T|body");

        let Node::Tag(div) = &root.children().unwrap()[0] else { panic!("expected div") };
        assert_eq!(div.attrs[0].value.as_static(), None);
        assert_eq!(div.context.parent.as_ref().map(|p| p.path.as_str()), Some("default/page.stm"));
    }

    #[test]
    fn test_use_is_scoped_to_its_element() {
        let loader = MemoryLoader::new()
            .with("card", "C")
            .with("page", r#"<div><use path="card"/><card/></div><card/>"#);
        let root = load(loader, "page").unwrap();
        assert_eq!(text(&root), "<div>C<card>");
    }

    #[test]
    fn test_include_element() {
        let loader = MemoryLoader::new()
            .with("partials/nav", "<nav>${content}</nav>")
            .with("page", "<include:partials.nav>links</include:partials.nav>");
        assert_eq!(text(&load(loader, "page").unwrap()), "<nav>links");
    }

    #[test]
    fn test_extends_with_parent_placeholder() {
        let loader = MemoryLoader::new()
            .with("layout", "<html><title>${title|Site}</title><block:body>default</block:body></html>")
            .with(
                "home",
                "<extends:layout title=\"Home\"/>\n<block:body>${parent} + mine</block:body>",
            );
        assert_eq!(text(&load(loader, "home").unwrap()), "<html><title>Homedefault + mine");
    }

    #[test]
    fn test_extends_cycle_is_merge_error() {
        let loader = MemoryLoader::new()
            .with("a", "<extends:b/>")
            .with("b", "<extends:a/>");
        let err = load(loader, "a").unwrap_err();
        match err {
            StratumError::MergeError { message, .. } => assert!(message.contains("cyclic")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_strict_blocks_reject_unknown_block() {
        let loader = MemoryLoader::new()
            .with("layout", "${body}")
            .with("home", "<extends:layout/><block:sidebar>x</block:sidebar>");
        let mut builder = Builder::new(Arc::new(loader));
        builder.options_mut().strict_blocks = true;
        let mut session = Session::new(RenderContext::default());
        let err = builder.load("home", &mut session, None).unwrap_err();
        assert!(matches!(err, StratumError::MergeError { line: 1, .. }));
    }

    #[test]
    fn test_include_cycle_is_merge_error() {
        let loader = MemoryLoader::new()
            .with("a", "<p>\n<include:b/></p>")
            .with("b", "<include:a/>");
        match load(loader, "a").unwrap_err() {
            StratumError::MergeError { message, file, line } => {
                assert!(message.contains("default:a -> default:b -> default:a"));
                assert_eq!(file, "default/b.stm");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_use_cycle_is_merge_error() {
        let loader = MemoryLoader::new()
            .with("a", r#"<use path="b" as="other"/><other/>"#)
            .with("b", r#"<use path="a" as="other"/><other/>"#);
        let err = load(loader, "a").unwrap_err();
        assert!(matches!(err, StratumError::MergeError { ref message, .. } if message.contains("cyclic")));
    }

    #[test]
    fn test_child_content_outside_blocks_is_discarded() {
        let loader = MemoryLoader::new()
            .with("layout", "<main>${body}</main>")
            .with("home", "<extends:layout/>\nstray <b>x</b>\n<block:body>y</block:body>");
        assert_eq!(text(&load(loader, "home").unwrap()), "<main>y");

        let raw = |content: &str| {
            Node::Raw(crate::ast::Raw {
                content: content.to_string(),
                context: Context::new("home.stm", 2, crate::lexer::Grammar::Html, content),
            })
        };
        assert!(!is_content(&raw("\n  \n")));
        assert!(is_content(&raw("stray ")));
    }
}
