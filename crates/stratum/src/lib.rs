// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

// StratumError carries source snippets and translated frames.
#![allow(clippy::result_large_err)]

//! # Stratum
//!
//! Layered, HTML-aware template compiler targeting Lua.
//!
//! Templates mix markup, `{{ echoes }}`, `@directives(...)` and `<?lua ?>`
//! host code. They are merged through layouts (`<extends:...>`), imports
//! (`<use>`, `<include:...>`) and stacks, compiled into a Lua chunk with a
//! source map, cached, and rendered in a sandboxed Lua state. Failures are
//! reported against template files and lines, never generated code.
//!
//! ## Features
//!
//! - Template inheritance with named blocks and `${parent}`
//! - Imports with attribute and block filling
//! - Stacks collecting pushed content in document order
//! - Whitespace normalization that leaves `<pre>` and attributes alone
//! - Pluggable directives, processors and visitors
//! - Memory and filesystem caching keyed by template and render context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stratum::{EngineBuilder, FileSystemLoader, RenderContext};
//!
//! let engine = EngineBuilder::new(FileSystemLoader::new("./views")).build()?;
//! let view = engine.compile("home", &RenderContext::new())?;
//! let html = view.render(&serde_json::json!({ "name": "World" }))?;
//! ```

/// Compiled artifacts and their registry.
pub mod artifact;
/// Template tree types.
pub mod ast;
/// Build pipeline from template reference to merged tree.
pub mod builder;
/// Compiled artifact caching.
pub mod cache;
/// Lua code generation.
pub mod compiler;
/// Compile-time render context.
pub mod context;
/// Directive providers and registry.
pub mod directive;
/// Main template engine.
pub mod engine;
/// Error types and reporting.
pub mod error;
/// Lua runtime extensions.
pub mod extensions;
/// Template tokenizer.
pub mod lexer;
/// Template location and loading.
pub mod loader;
/// Template parser.
pub mod parser;
/// Source processors.
pub mod processor;
/// Service lookup for templates.
pub mod services;
/// Generated line to template location mapping.
pub mod sourcemap;
/// Executable views.
pub mod view;
/// Tree visitors and the traversal driving them.
pub mod visitor;

pub use artifact::{Artifact, ArtifactRegistry};
pub use ast::{Ast, Context, Node};
pub use builder::{BuildOptions, Builder, Session};
pub use cache::{Cache, CacheEntry, MemoryCache, NoOpCache};
#[cfg(feature = "filesystem")]
pub use cache::FileCache;
pub use compiler::{CompiledResult, Compiler, Output, Renderer};
pub use context::RenderContext;
pub use directive::{DirectiveProvider, DirectiveRegistry};
pub use engine::{CacheConfig, Engine, EngineBuilder, EngineConfig};
pub use error::{Result, StratumError};
pub use extensions::register_json_module;
pub use lexer::Grammar;
pub use loader::{Loader, MemoryLoader, ViewSource};
#[cfg(feature = "filesystem")]
pub use loader::FileSystemLoader;
pub use processor::Processor;
pub use services::{ServiceContainer, ServiceLocator};
pub use sourcemap::{Frame, SourceMap};
pub use view::View;
pub use visitor::{Action, Scope, Stage, Visitor, VisitorContext};

// Re-export mlua value
pub use mlua::Value;
