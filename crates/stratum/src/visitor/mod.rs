// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Visitor pipeline over the template AST.
//!
//! The builder runs three stages in order: [`Stage::Prepare`] annotates the
//! tree, [`Stage::Transform`] merges imports and parents, [`Stage::Finalize`]
//! shapes the output. Each stage is one depth-first traversal that calls the
//! stage's visitors in registration order on entry to and exit from every
//! node. Visitors see the chain of enclosing scopes through
//! [`VisitorContext`].

pub mod finalize;
pub mod merge;
pub mod prepare;

use crate::ast::{AttrValue, Context, Node, Raw};
use crate::builder::{Builder, Session};
use crate::error::Result;
use std::sync::Arc;

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Structural annotation.
    Prepare,
    /// Cross-file merge.
    Transform,
    /// Output shaping.
    Finalize,
}

/// An enclosing node as seen from inside its subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Template root; carries the file path.
    Template(String),
    /// Element; carries the element name.
    Tag(String),
    /// Attribute value; carries the attribute name.
    Attr(String),
    /// Block slot.
    Block(String),
    /// Stack collection point.
    Stack(String),
    /// Stack contribution.
    Push(String),
    /// Unresolved import.
    Import(String),
}

/// What the traversal does with the visited node.
#[derive(Debug)]
pub enum Action {
    /// Keep the node (possibly modified in place) and keep going.
    Continue,
    /// Keep the node but do not descend into it. Only meaningful on enter.
    SkipChildren,
    /// Drop the node and its subtree.
    Remove,
    /// Replace the node with these nodes; they are not visited again.
    Replace(Vec<Node>),
}

/// A node visitor. Both hooks default to [`Action::Continue`].
pub trait Visitor {
    /// Called before the node's attributes and children are visited.
    fn enter(&mut self, _node: &mut Node, _ctx: &mut VisitorContext<'_>) -> Result<Action> {
        Ok(Action::Continue)
    }

    /// Called after the node's attributes and children are visited.
    fn leave(&mut self, _node: &mut Node, _ctx: &mut VisitorContext<'_>) -> Result<Action> {
        Ok(Action::Continue)
    }
}

/// Creates a fresh visitor for each traversal.
pub type VisitorFactory = Arc<dyn Fn() -> Box<dyn Visitor> + Send + Sync>;

/// Predicate over the scope stack deciding whether raw text must be left untouched.
pub type PreservePredicate = Arc<dyn Fn(&[Scope]) -> bool + Send + Sync>;

/// Default whitespace preservation: attribute values and the named elements.
pub fn preserve_in(tags: Vec<String>) -> PreservePredicate {
    Arc::new(move |scopes: &[Scope]| {
        scopes.iter().any(|scope| match scope {
            Scope::Attr(_) => true,
            Scope::Tag(name) => tags.iter().any(|t| t.eq_ignore_ascii_case(name)),
            _ => false,
        })
    })
}

/// Traversal state handed to visitors.
pub struct VisitorContext<'a> {
    scopes: Vec<Scope>,
    builder: &'a Builder,
    session: &'a mut Session,
}

impl<'a> VisitorContext<'a> {
    pub(crate) fn new(builder: &'a Builder, session: &'a mut Session) -> Self {
        Self {
            scopes: Vec::new(),
            builder,
            session,
        }
    }

    /// Enclosing scopes, outermost first.
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The innermost enclosing scope.
    pub fn parent(&self) -> Option<&Scope> {
        self.scopes.last()
    }

    /// Number of enclosing scopes; the template root is at depth 0.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Whether the current node sits inside an attribute value.
    pub fn in_attribute(&self) -> bool {
        self.scopes.iter().any(|s| matches!(s, Scope::Attr(_)))
    }

    /// The builder running this traversal.
    pub fn builder(&self) -> &Builder {
        self.builder
    }

    /// Loads another template through the full prepare and transform stages.
    ///
    /// `origin` is the referencing node, used for cycle diagnostics.
    pub fn load(&mut self, path: &str, origin: &Context) -> Result<Node> {
        self.builder.load(path, self.session, Some(origin))
    }

    /// Like [`load`](Self::load) but reuses a fragment already resolved in this compile.
    ///
    /// Fragments are memoized by template identity, so `card` and
    /// `default:card` share one resolution.
    pub fn load_fragment(&mut self, path: &str, origin: &Context) -> Result<Node> {
        let identity = self.builder.loader().load(path).ok().map(|view| view.identity());
        if let Some(fragment) = identity.as_deref().and_then(|id| self.session.fragment(id)) {
            return Ok(fragment.clone());
        }
        let fragment = self.builder.load(path, self.session, Some(origin))?;
        if let Some(identity) = identity {
            self.session.remember_fragment(&identity, fragment.clone());
        }
        Ok(fragment)
    }
}

fn scope_of(node: &Node) -> Option<Scope> {
    match node {
        Node::Template { context, .. } => Some(Scope::Template(context.path.clone())),
        Node::Tag(tag) => Some(Scope::Tag(tag.name.clone())),
        Node::Block(block) => Some(Scope::Block(block.name.clone())),
        Node::Stack(stack) => Some(Scope::Stack(stack.name.clone())),
        Node::Push(push) => Some(Scope::Push(push.name.clone())),
        Node::Import(import) => Some(Scope::Import(import.path.clone())),
        Node::Raw(_) | Node::Directive(_) | Node::Echo(_) | Node::HostCode(_) => None,
    }
}

/// Runs `visitors` over the tree rooted at `root`.
///
/// A root replaced by several nodes is rewrapped into a template root.
pub fn traverse(visitors: &mut [Box<dyn Visitor>], root: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<()> {
    let context = root.context().clone();
    let placeholder = Node::Raw(Raw {
        content: String::new(),
        context: context.clone(),
    });
    let node = std::mem::replace(root, placeholder);

    let mut nodes = visit_node(visitors, node, ctx)?;
    *root = match (nodes.len(), nodes.first()) {
        (1, Some(Node::Template { .. })) => nodes.remove(0),
        _ => Node::Template {
            children: nodes,
            context,
        },
    };
    Ok(())
}

fn visit_node(visitors: &mut [Box<dyn Visitor>], mut node: Node, ctx: &mut VisitorContext<'_>) -> Result<Vec<Node>> {
    let mut descend = true;
    for visitor in visitors.iter_mut() {
        match visitor.enter(&mut node, ctx)? {
            Action::Continue => {}
            Action::SkipChildren => descend = false,
            Action::Remove => return Ok(Vec::new()),
            Action::Replace(nodes) => return Ok(nodes),
        }
    }

    if descend {
        visit_children(visitors, &mut node, ctx)?;
    }

    for visitor in visitors.iter_mut() {
        match visitor.leave(&mut node, ctx)? {
            Action::Continue | Action::SkipChildren => {}
            Action::Remove => return Ok(Vec::new()),
            Action::Replace(nodes) => return Ok(nodes),
        }
    }

    Ok(vec![node])
}

fn visit_children(visitors: &mut [Box<dyn Visitor>], node: &mut Node, ctx: &mut VisitorContext<'_>) -> Result<()> {
    let Some(scope) = scope_of(node) else {
        return Ok(());
    };
    ctx.scopes.push(scope);

    let result = (|| {
        let attrs = match node {
            Node::Tag(tag) => Some(&mut tag.attrs),
            Node::Import(import) => Some(&mut import.attrs),
            _ => None,
        };
        if let Some(attrs) = attrs {
            for attr in attrs.iter_mut() {
                if let AttrValue::Quoted { nodes, .. } | AttrValue::Dynamic(nodes) = &mut attr.value {
                    ctx.scopes.push(Scope::Attr(attr.name.clone()));
                    let visited = visit_list(visitors, nodes, ctx);
                    ctx.scopes.pop();
                    visited?;
                }
            }
        }
        if let Some(children) = node.children_mut() {
            visit_list(visitors, children, ctx)?;
        }
        Ok(())
    })();

    ctx.scopes.pop();
    result
}

fn visit_list(visitors: &mut [Box<dyn Visitor>], list: &mut Vec<Node>, ctx: &mut VisitorContext<'_>) -> Result<()> {
    let nodes = std::mem::take(list);
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.extend(visit_node(visitors, node, ctx)?);
    }
    *list = out;
    Ok(())
}
