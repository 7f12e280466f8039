// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Stratum template engine for compiling and rendering templates.
//!
//! This module provides the [`Engine`] type that handles the complete
//! template lifecycle: loading, building, compiling, caching and
//! materializing into a Lua state.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use stratum::{EngineBuilder, FileSystemLoader, RenderContext};
//!
//! let engine = EngineBuilder::new(FileSystemLoader::new("./views")).build()?;
//!
//! let view = engine.compile("home", &RenderContext::new())?;
//! let html = view.render(&serde_json::json!({ "name": "World" }))?;
//! ```
//!
//! # Architecture
//!
//! - **Loader**: locates template files by `namespace:name`
//! - **Builder**: lexes, parses and merges templates through the visitor stages
//! - **Compiler**: turns the merged tree into a Lua body with a source map
//! - **Cache**: stores compiled chunks keyed by template and render context
//! - **Lua runtime**: runs the chunk in a sandboxed state
//!
//! # Thread Safety
//!
//! An engine can be shared between threads. Defining an artifact and
//! materializing it into the Lua state are both idempotent, so concurrent
//! compiles of one template end up with a single definition.

use crate::artifact::{Artifact, ArtifactRegistry};
use crate::builder::{Builder, DEFAULT_MAX_DEPTH, DEFAULT_PRESERVE_TAGS};
use crate::cache::{fingerprint, Cache, CacheEntry, MemoryCache, NoOpCache};
use crate::context::RenderContext;
use crate::directive::{DirectiveProvider, DirectiveRegistry, BUILTIN_PROVIDERS};
use crate::error::{Result, StratumError};
use crate::loader::{Loader, DEFAULT_EXTENSION};
use crate::processor::{builtin_processor, Processor};
use crate::services::{ServiceContainer, ServiceLocator};
use crate::sourcemap::SourceMap;
use crate::view::{self, View};
use crate::visitor::{preserve_in, PreservePredicate, Stage, VisitorFactory};
use mlua::{Function, Lua, Table};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[cfg(feature = "filesystem")]
use crate::cache::FileCache;
#[cfg(feature = "filesystem")]
use crate::loader::FileSystemLoader;
#[cfg(feature = "filesystem")]
use std::path::Path;

/// Default capacity of the in-memory cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Where compiled artifacts are cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheConfig {
    /// No caching; every compile starts from source.
    None,
    /// In-process LRU cache.
    Memory {
        /// Maximum number of entries.
        #[serde(default = "default_cache_capacity")]
        capacity: usize,
    },
    /// Persistent cache directory.
    Directory {
        /// Cache directory.
        path: PathBuf,
    },
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Engine configuration.
///
/// Every field has a default, so a partial TOML or JSON document is enough:
///
/// ```toml
/// directives = ["conditional", "loop"]
/// strict_blocks = true
///
/// [cache]
/// type = "directory"
/// path = ".stratum/cache"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Built-in directive providers, in resolution order.
    pub directives: Vec<String>,
    /// Built-in source processors, in application order.
    pub processors: Vec<String>,
    /// Elements whose text keeps its line breaks.
    pub preserve_tags: Vec<String>,
    /// Reject child blocks a parent layout does not define.
    pub strict_blocks: bool,
    /// Maximum depth of nested extends and imports.
    pub max_depth: usize,
    /// Template file extension.
    pub extension: String,
    /// Artifact cache.
    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directives: BUILTIN_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            processors: vec!["context".to_string()],
            preserve_tags: DEFAULT_PRESERVE_TAGS.iter().map(|s| s.to_string()).collect(),
            strict_blocks: false,
            max_depth: DEFAULT_MAX_DEPTH,
            extension: DEFAULT_EXTENSION.to_string(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// A loader rooted at `root` using the configured extension.
    #[cfg(feature = "filesystem")]
    pub fn filesystem_loader<P: AsRef<Path>>(&self, root: P) -> FileSystemLoader {
        FileSystemLoader::new(root).with_extension(&self.extension)
    }

    fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(StratumError::ConfigError("max_depth must be at least 1".to_string()));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(StratumError::ConfigError("extension must not be empty".to_string()));
        }
        Ok(())
    }

    fn create_cache(&self) -> Result<Arc<dyn Cache>> {
        let cache: Arc<dyn Cache> = match &self.cache {
            CacheConfig::None => Arc::new(NoOpCache),
            CacheConfig::Memory { capacity } => Arc::new(MemoryCache::new(*capacity)),
            #[cfg(feature = "filesystem")]
            CacheConfig::Directory { path } => Arc::new(FileCache::new(path)),
            #[cfg(not(feature = "filesystem"))]
            CacheConfig::Directory { .. } => {
                return Err(StratumError::ConfigError(
                    "directory cache requires the `filesystem` feature".to_string(),
                ))
            }
        };
        Ok(cache)
    }
}

/// Assembles an [`Engine`].
pub struct EngineBuilder {
    loader: Arc<dyn Loader>,
    config: EngineConfig,
    cache: Option<Arc<dyn Cache>>,
    services: Arc<dyn ServiceLocator>,
    directives: Vec<Arc<dyn DirectiveProvider>>,
    processors: Vec<Arc<dyn Processor>>,
    visitors: Vec<(Stage, VisitorFactory)>,
    preserve: Option<PreservePredicate>,
}

impl EngineBuilder {
    /// Starts an engine over `loader` with the default configuration.
    pub fn new<L: Loader + 'static>(loader: L) -> Self {
        Self::with_loader(Arc::new(loader))
    }

    /// Starts an engine over a shared loader.
    pub fn with_loader(loader: Arc<dyn Loader>) -> Self {
        Self {
            loader,
            config: EngineConfig::default(),
            cache: None,
            services: Arc::new(ServiceContainer::new()),
            directives: Vec::new(),
            processors: Vec::new(),
            visitors: Vec::new(),
            preserve: None,
        }
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `cache` instead of the configured one.
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the service locator consulted by `@inject` and `@route`.
    pub fn services(mut self, services: Arc<dyn ServiceLocator>) -> Self {
        self.services = services;
        self
    }

    /// Adds a directive provider ahead of the configured built-ins.
    pub fn directive(mut self, provider: Arc<dyn DirectiveProvider>) -> Self {
        self.directives.push(provider);
        self
    }

    /// Adds a source processor after the configured built-ins.
    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Adds a visitor to a pipeline stage, after the default visitors.
    pub fn visitor(mut self, stage: Stage, factory: VisitorFactory) -> Self {
        self.visitors.push((stage, factory));
        self
    }

    /// Replaces the whitespace preservation predicate.
    pub fn preserve(mut self, predicate: PreservePredicate) -> Self {
        self.preserve = Some(predicate);
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`StratumError::ConfigError`] for unknown provider or
    /// processor names and invalid limits, and [`StratumError::LuaError`] if
    /// the Lua runtime fails to initialize.
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        config.validate()?;

        let mut registry = DirectiveRegistry::from_names(&config.directives)?;
        for provider in self.directives.into_iter().rev() {
            registry.register_first(provider);
        }
        let preserve = self
            .preserve
            .unwrap_or_else(|| preserve_in(config.preserve_tags.clone()));

        let mut builder = Builder::with_directives(self.loader, Arc::new(registry), preserve);
        builder.clear_processors();
        for name in &config.processors {
            let processor = builtin_processor(name)
                .ok_or_else(|| StratumError::ConfigError(format!("unknown processor `{}`", name)))?;
            builder.add_processor(processor);
        }
        for processor in self.processors {
            builder.add_processor(processor);
        }
        for (stage, factory) in self.visitors {
            builder.add_visitor(stage, factory);
        }
        builder.options_mut().max_depth = config.max_depth;
        builder.options_mut().strict_blocks = config.strict_blocks;

        let cache = match self.cache {
            Some(cache) => cache,
            None => config.create_cache()?,
        };

        let lua = Lua::new();
        sandbox_lua(&lua, &lua.globals())?;
        crate::extensions::register_json_module(&lua)?;

        let services = self.services;
        let lookup = lua.create_function(move |lua, id: String| services.resolve(lua, &id))?;

        tracing::debug!("Engine ready: {:?}", builder);
        Ok(Engine {
            builder,
            cache,
            registry: ArtifactRegistry::new(),
            lua,
            lookup,
            materializing: Mutex::new(()),
        })
    }
}

/// Sandboxes the Lua environment by disabling dangerous functions and libraries.
///
/// This removes access to:
/// - `io` library (file I/O)
/// - `debug` library (introspection)
/// - `load`, `loadstring`, `loadfile`, `dofile` (dynamic code execution)
/// - Most of `os` library (keeps only `os.date`, `os.time`, `os.clock`, `os.difftime`)
fn sandbox_lua(lua: &Lua, globals: &Table) -> Result<()> {
    let os_table: Table = globals.get("os")?;
    let safe_os = lua.create_table()?;
    for name in ["date", "time", "clock", "difftime"] {
        let function: Function = os_table.get(name)?;
        safe_os.set(name, function)?;
    }

    for name in ["io", "debug", "load", "loadstring", "loadfile", "dofile"] {
        globals.set(name, mlua::Value::Nil)?;
    }
    globals.set("os", safe_os)?;
    Ok(())
}

/// Main Stratum template engine.
///
/// # Examples
///
/// ```rust,ignore
/// use stratum::{EngineBuilder, MemoryLoader, RenderContext};
///
/// let loader = MemoryLoader::new().with("hello", "<h1>Hello, {{ name }}!</h1>");
/// let engine = EngineBuilder::new(loader).build()?;
/// let html = engine.render("hello", &serde_json::json!({ "name": "World" }))?;
/// ```
pub struct Engine {
    builder: Builder,
    cache: Arc<dyn Cache>,
    registry: ArtifactRegistry,
    lua: Lua,
    lookup: Function,
    materializing: Mutex<()>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("builder", &self.builder)
            .field("cache", &self.cache)
            .field("artifacts", &self.registry.len())
            .finish()
    }
}

impl Engine {
    /// Creates an engine over `loader` with the default configuration.
    pub fn new<L: Loader + 'static>(loader: L) -> Result<Self> {
        EngineBuilder::new(loader).build()
    }

    /// The template builder.
    pub fn builder(&self) -> &Builder {
        &self.builder
    }

    /// The artifact cache.
    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Artifacts defined so far.
    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    /// The Lua state views execute in.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Cache fingerprint of `path` under `context`.
    pub fn fingerprint(&self, path: &str, context: &RenderContext) -> Result<String> {
        let view = self
            .builder
            .loader()
            .load(path)
            .map_err(|err| StratumError::compile(path, err))?;
        Ok(fingerprint(&view.namespace, &view.name, &context.id()))
    }

    /// Compiles `path` under `context` into an executable view.
    ///
    /// A fresh cache entry is reused; otherwise the template is built from
    /// source and the result written back to the cache. An entry whose chunk
    /// no longer loads is discarded and rebuilt like a miss.
    ///
    /// # Errors
    ///
    /// Every failure is a [`StratumError::CompileError`] naming the template
    /// file it originated in.
    pub fn compile(&self, path: &str, context: &RenderContext) -> Result<View> {
        let key = self.fingerprint(path, context)?;

        if let Some(artifact) = self.cache.load(&key, &self.registry) {
            match self.materialize(&artifact) {
                Ok(function) => return Ok(self.view(function, artifact)),
                Err(err) => {
                    tracing::warn!("Discarding unusable cache entry {} of {}: {}", key, path, err);
                    self.discard(&key);
                }
            }
        }

        let compiled = self
            .builder
            .compile(path, context)
            .map_err(|err| StratumError::compile(path, err))?;
        let artifact = self.registry.define(view::assemble(&key, path, compiled));
        if let Err(err) = self.cache.write(&CacheEntry::new(&artifact)) {
            tracing::warn!("Unable to cache {}: {}", path, err);
        }

        match self.materialize(&artifact) {
            Ok(function) => Ok(self.view(function, artifact)),
            Err(err) => {
                self.discard(&key);
                Err(err)
            }
        }
    }

    /// Compiles `path` under the default context and renders it with `data`.
    pub fn render<T: Serialize + ?Sized>(&self, path: &str, data: &T) -> Result<String> {
        self.compile(path, &RenderContext::default())?.render(data)
    }

    /// Drops the cached artifact of `path` under `context`.
    pub fn reset(&self, path: &str, context: &RenderContext) -> Result<()> {
        let key = self.fingerprint(path, context)?;
        self.discard(&key);
        tracing::debug!("Reset {} ({})", path, key);
        Ok(())
    }

    /// Source map of `path` under `context`, or `None` if it does not compile.
    pub fn source_map(&self, path: &str, context: &RenderContext) -> Option<SourceMap> {
        match self.compile(path, context) {
            Ok(view) => Some(view.source_map().clone()),
            Err(err) => {
                tracing::debug!("No source map for {}: {}", path, err);
                None
            }
        }
    }

    /// Every template the loader can serve, as `namespace:name`.
    pub fn list(&self) -> Result<Vec<String>> {
        self.builder.loader().list()
    }

    fn view(&self, function: Function, artifact: Arc<Artifact>) -> View {
        View::new(self.lua.clone(), function, self.lookup.clone(), artifact)
    }

    fn discard(&self, key: &str) {
        if let Err(err) = self.cache.delete(key) {
            tracing::warn!("Unable to delete cache entry {}: {}", key, err);
        }
        self.registry.forget(key);
    }

    /// Loads the artifact chunk into the Lua state once.
    fn materialize(&self, artifact: &Artifact) -> Result<Function> {
        let _guard = self.materializing.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let slot = format!("stratum:{}", artifact.id);
        if let Some(function) = self.lua.named_registry_value::<Option<Function>>(&slot)? {
            return Ok(function);
        }

        let function: Function = self
            .lua
            .load(artifact.source.as_str())
            .set_name(format!("@{}", artifact.id))
            .call(())
            .map_err(|err| view::load_error(artifact, err))?;
        self.lua.set_named_registry_value(&slot, function.clone())?;
        tracing::debug!("Materialized {} as {}", artifact.template, artifact.id);
        Ok(function)
    }
}
