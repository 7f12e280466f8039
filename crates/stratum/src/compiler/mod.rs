// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Lua code generation from a finalized AST.
//!
//! The [`Compiler`] walks the tree and hands every node to its
//! [`Renderer`]s in order until one claims it. Renderers write into an
//! [`Output`], which coalesces adjacent literal text into a single
//! `__write("...")` call and records the template location of every
//! generated line in a [`SourceMap`].
//!
//! The generated body expects `__write`, `__escape`, `__tostring`, `__json`
//! and `__service` to be in scope; the engine supplies them.

mod renderers;

pub use renderers::{CoreRenderer, HostRenderer, HtmlRenderer};

use crate::ast::{Ast, Context, Node};
use crate::error::{Result, StratumError};
use crate::sourcemap::SourceMap;

/// Escapes a string for use inside a double-quoted Lua literal.
pub fn escape_lua_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .replace('\0', "\\x00")
}

/// Result of compiling one template.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledResult {
    /// Generated Lua body.
    pub content: String,
    /// Every template file the result depends on.
    pub paths: Vec<String>,
    /// Generated line to template location mapping.
    pub source_map: SourceMap,
}

/// Generated code under construction.
#[derive(Debug, Default)]
pub struct Output {
    lines: Vec<String>,
    text: String,
    text_context: Option<Context>,
    source_map: SourceMap,
}

impl Output {
    /// Creates an empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends literal text to be written verbatim.
    pub fn text(&mut self, text: &str, context: &Context) {
        if text.is_empty() {
            return;
        }
        if self.text_context.is_none() {
            self.text_context = Some(context.clone());
        }
        self.text.push_str(text);
    }

    /// Appends host code; line `i` of `code` maps to `context.line + i`.
    pub fn code(&mut self, code: &str, context: &Context) {
        self.flush();
        for (i, line) in code.lines().enumerate() {
            let mut mapped = context.clone();
            mapped.line += i;
            self.push_line(line.to_string(), &mapped);
        }
    }

    fn push_line(&mut self, line: String, context: &Context) {
        self.lines.push(line);
        self.source_map.record(self.lines.len(), context);
    }

    fn flush(&mut self) {
        if let Some(context) = self.text_context.take() {
            let line = format!("__write(\"{}\")", escape_lua_string(&self.text));
            self.text.clear();
            self.push_line(line, &context);
        }
    }

    /// Finishes the output, returning the generated code and its line mappings.
    pub fn finish(mut self) -> (String, SourceMap) {
        self.flush();
        let mut content = self.lines.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        (content, self.source_map)
    }
}

/// Renders the node kinds it understands.
pub trait Renderer: Send + Sync {
    /// Writes `node` into `out`; returns false if the node is not handled.
    fn render(&self, compiler: &Compiler, out: &mut Output, node: &Node) -> Result<bool>;
}

/// Turns a finalized AST into Lua code.
pub struct Compiler {
    renderers: Vec<Box<dyn Renderer>>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
            .with_renderer(Box::new(CoreRenderer))
            .with_renderer(Box::new(HtmlRenderer))
            .with_renderer(Box::new(HostRenderer))
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("renderers", &self.renderers.len())
            .finish()
    }
}

impl Compiler {
    /// Creates a compiler without renderers.
    pub fn new() -> Self {
        Self { renderers: Vec::new() }
    }

    /// Appends a renderer; earlier renderers get the first chance at every node.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderers.push(renderer);
        self
    }

    /// Compiles `ast` into a Lua body.
    pub fn compile(&self, ast: &Ast) -> Result<CompiledResult> {
        let mut out = Output::new();
        self.render(&mut out, &ast.root)?;
        let (content, mut source_map) = out.finish();
        source_map.paths = ast.paths.clone();
        Ok(CompiledResult {
            content,
            paths: ast.paths.clone(),
            source_map,
        })
    }

    /// Renders one node through the first renderer that claims it.
    pub fn render(&self, out: &mut Output, node: &Node) -> Result<()> {
        for renderer in &self.renderers {
            if renderer.render(self, out, node)? {
                return Ok(());
            }
        }
        let context = node.context();
        Err(StratumError::ParseError {
            message: format!("no renderer for {} node", node.kind()),
            file: context.path.clone(),
            line: context.line,
            source_context: None,
        })
    }

    /// Renders nodes in order.
    pub fn render_all(&self, out: &mut Output, nodes: &[Node]) -> Result<()> {
        for node in nodes {
            self.render(out, node)?;
        }
        Ok(())
    }
}
