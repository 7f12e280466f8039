// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template build pipeline.
//!
//! [`Builder::load`] takes one template from reference to merged tree:
//! loader, processors, lexer, parser, then the prepare and transform
//! visitor stages. Imports and extends call back into `load` through the
//! [`VisitorContext`], sharing one [`Session`] per compile.
//! [`Builder::compile`] adds the finalize stage and code generation.

use crate::ast::{Ast, Context, Node};
use crate::compiler::{CompiledResult, Compiler};
use crate::context::RenderContext;
use crate::directive::DirectiveRegistry;
use crate::error::{Result, StratumError};
use crate::loader::{Loader, ViewSource};
use crate::parser::parse_template;
use crate::processor::{ContextProcessor, Processor};
use crate::visitor::finalize::{ExpandDirectives, StackCollector, TrimLines};
use crate::visitor::merge::{ExtendsParent, ResolveImports};
use crate::visitor::prepare::{DefineAttributes, DefineBlocks, DefineHidden, DefineStacks};
use crate::visitor::{preserve_in, traverse, PreservePredicate, Stage, Visitor, VisitorContext, VisitorFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// Default cap on nested extends/import resolution.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Elements whose text is never whitespace-normalized by default.
pub const DEFAULT_PRESERVE_TAGS: &[&str] = &["pre", "textarea"];

/// Build behavior switches.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Maximum depth of nested template resolution.
    pub max_depth: usize,
    /// Reject child blocks the parent layout does not define.
    pub strict_blocks: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            strict_blocks: false,
        }
    }
}

/// Per-compile resolution state.
#[derive(Debug)]
pub struct Session {
    context: RenderContext,
    resolving: Vec<String>,
    paths: Vec<String>,
    fragments: HashMap<String, Node>,
}

impl Session {
    /// Creates a session compiling under `context`.
    pub fn new(context: RenderContext) -> Self {
        Self {
            context,
            resolving: Vec::new(),
            paths: Vec::new(),
            fragments: HashMap::new(),
        }
    }

    /// The render context of this compile.
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Files consulted so far, in first-seen order.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub(crate) fn fragment(&self, path: &str) -> Option<&Node> {
        self.fragments.get(path)
    }

    pub(crate) fn remember_fragment(&mut self, path: &str, fragment: Node) {
        self.fragments.insert(path.to_string(), fragment);
    }

    fn record_path(&mut self, filename: &str) {
        if !self.paths.iter().any(|p| p == filename) {
            self.paths.push(filename.to_string());
        }
    }
}

fn factory<V: Visitor + Default + 'static>() -> VisitorFactory {
    Arc::new(|| Box::new(V::default()) as Box<dyn Visitor>)
}

/// Builds and compiles templates.
pub struct Builder {
    loader: Arc<dyn Loader>,
    processors: Vec<Arc<dyn Processor>>,
    prepare: Vec<VisitorFactory>,
    transform: Vec<VisitorFactory>,
    finalize: Vec<VisitorFactory>,
    compiler: Compiler,
    options: BuildOptions,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("processors", &self.processors.len())
            .field("prepare", &self.prepare.len())
            .field("transform", &self.transform.len())
            .field("finalize", &self.finalize.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Builder {
    /// Creates a builder with the default pipeline and every built-in directive.
    pub fn new(loader: Arc<dyn Loader>) -> Self {
        let preserve = preserve_in(DEFAULT_PRESERVE_TAGS.iter().map(|t| t.to_string()).collect());
        Self::with_directives(loader, Arc::new(DirectiveRegistry::builtin()), preserve)
    }

    /// Creates a builder with the default pipeline over `registry` and `preserve`.
    pub fn with_directives(
        loader: Arc<dyn Loader>,
        registry: Arc<DirectiveRegistry>,
        preserve: PreservePredicate,
    ) -> Self {
        let mut builder = Self::bare(loader);
        builder.add_processor(Arc::new(ContextProcessor));

        builder.add_visitor(Stage::Prepare, factory::<DefineAttributes>());
        builder.add_visitor(Stage::Prepare, factory::<DefineBlocks>());
        builder.add_visitor(Stage::Prepare, factory::<DefineHidden>());
        builder.add_visitor(Stage::Prepare, factory::<DefineStacks>());

        builder.add_visitor(Stage::Transform, factory::<ResolveImports>());
        builder.add_visitor(Stage::Transform, factory::<ExtendsParent>());

        builder.add_visitor(Stage::Finalize, factory::<StackCollector>());
        builder.add_visitor(
            Stage::Finalize,
            Arc::new(move || Box::new(ExpandDirectives::new(registry.clone())) as Box<dyn Visitor>),
        );
        builder.add_visitor(
            Stage::Finalize,
            Arc::new(move || Box::new(TrimLines::new(preserve.clone())) as Box<dyn Visitor>),
        );
        builder
    }

    /// Creates a builder with no processors and no visitors.
    pub fn bare(loader: Arc<dyn Loader>) -> Self {
        Self {
            loader,
            processors: Vec::new(),
            prepare: Vec::new(),
            transform: Vec::new(),
            finalize: Vec::new(),
            compiler: Compiler::default(),
            options: BuildOptions::default(),
        }
    }

    /// Appends a visitor to a stage.
    pub fn add_visitor(&mut self, stage: Stage, factory: VisitorFactory) {
        match stage {
            Stage::Prepare => self.prepare.push(factory),
            Stage::Transform => self.transform.push(factory),
            Stage::Finalize => self.finalize.push(factory),
        }
    }

    /// Appends a source processor.
    pub fn add_processor(&mut self, processor: Arc<dyn Processor>) {
        self.processors.push(processor);
    }

    /// Removes every source processor.
    pub fn clear_processors(&mut self) {
        self.processors.clear();
    }

    /// Replaces the code generator.
    pub fn set_compiler(&mut self, compiler: Compiler) {
        self.compiler = compiler;
    }

    /// The template loader.
    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    /// Build options.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Mutable build options.
    pub fn options_mut(&mut self) -> &mut BuildOptions {
        &mut self.options
    }

    /// Loads `path` through the prepare and transform stages.
    ///
    /// `origin` is the referencing element when called for an import or an
    /// extends; failures to locate the template are then reported as
    /// [`StratumError::MergeError`] at the reference.
    pub fn load(&self, path: &str, session: &mut Session, origin: Option<&Context>) -> Result<Node> {
        let view = self.loader.load(path).map_err(|err| match origin {
            Some(origin) => StratumError::MergeError {
                message: format!("unable to resolve `{}`: {}", path, err),
                file: origin.path.clone(),
                line: origin.line,
            },
            None => err,
        })?;

        let identity = view.identity();
        if session.resolving.contains(&identity) {
            let mut chain = session.resolving.clone();
            chain.push(identity);
            return Err(Self::reference_error(
                origin,
                &view,
                format!("cyclic reference: {}", chain.join(" -> ")),
            ));
        }
        if session.resolving.len() >= self.options.max_depth {
            return Err(Self::reference_error(
                origin,
                &view,
                format!("template nesting exceeds {} levels", self.options.max_depth),
            ));
        }

        tracing::debug!("Loading view {} from {}", identity, view.filename);
        session.record_path(&view.filename);
        session.resolving.push(identity);
        let result = self.parse(&view, session);
        session.resolving.pop();
        result
    }

    fn reference_error(origin: Option<&Context>, view: &ViewSource, message: String) -> StratumError {
        let (file, line) = match origin {
            Some(origin) => (origin.path.clone(), origin.line),
            None => (view.filename.clone(), 1),
        };
        StratumError::MergeError { message, file, line }
    }

    fn parse(&self, view: &ViewSource, session: &mut Session) -> Result<Node> {
        let mut source = self.loader.read(view)?;
        for processor in &self.processors {
            source = processor.process(view, source, &session.context)?;
        }

        let mut root = parse_template(&source, &view.filename)?;
        self.run(Stage::Prepare, &mut root, session)?;
        self.run(Stage::Transform, &mut root, session)?;
        Ok(root)
    }

    fn run(&self, stage: Stage, root: &mut Node, session: &mut Session) -> Result<()> {
        let factories = match stage {
            Stage::Prepare => &self.prepare,
            Stage::Transform => &self.transform,
            Stage::Finalize => &self.finalize,
        };
        if factories.is_empty() {
            return Ok(());
        }
        tracing::trace!("Running {:?} stage on {}", stage, root.context().path);
        let mut visitors: Vec<Box<dyn Visitor>> = factories.iter().map(|f| f()).collect();
        let mut ctx = VisitorContext::new(self, session);
        traverse(&mut visitors, root, &mut ctx)
    }

    /// Loads and finalizes `path` without generating code.
    pub fn build(&self, path: &str, context: &RenderContext) -> Result<Ast> {
        let mut session = Session::new(context.clone());
        let mut root = self.load(path, &mut session, None)?;
        self.run(Stage::Finalize, &mut root, &mut session)?;
        Ok(Ast {
            root,
            paths: session.paths,
        })
    }

    /// Builds and compiles `path` into a Lua body.
    pub fn compile(&self, path: &str, context: &RenderContext) -> Result<CompiledResult> {
        let ast = self.build(path, context)?;
        self.compiler.compile(&ast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts reads of the wrapped loader.
    struct CountingLoader {
        inner: MemoryLoader,
        reads: AtomicUsize,
    }

    impl Loader for CountingLoader {
        fn load(&self, path: &str) -> Result<ViewSource> {
            self.inner.load(path)
        }

        fn read(&self, view: &ViewSource) -> Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(view)
        }

        fn list(&self) -> Result<Vec<String>> {
            self.inner.list()
        }
    }

    #[test]
    fn test_compile_collects_paths_in_first_seen_order() {
        let loader = MemoryLoader::new()
            .with("layout", "<main>${body}</main>")
            .with("partials/nav", "<nav/>")
            .with("home", "<extends:layout/><block:body><include:partials.nav/>hi</block:body>");
        let builder = Builder::new(Arc::new(loader));
        let result = builder.compile("home", &RenderContext::new()).unwrap();
        assert_eq!(
            result.paths,
            vec!["default/home.stm", "default/partials/nav.stm", "default/layout.stm"]
        );
        assert_eq!(result.content, "__write(\"<main><nav/>hi</main>\")\n");
    }

    #[test]
    fn test_fragment_is_resolved_once_per_compile() {
        let loader = Arc::new(CountingLoader {
            inner: MemoryLoader::new()
                .with("card", "<div>${content}</div>")
                .with("page", "<use path=\"card\"/><card>a</card><card>b</card><card>c</card>"),
            reads: AtomicUsize::new(0),
        });
        let builder = Builder::new(loader.clone());
        let result = builder.compile("page", &RenderContext::new()).unwrap();
        assert_eq!(result.content, "__write(\"<div>a</div><div>b</div><div>c</div>\")\n");
        assert_eq!(loader.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fragment_memo_is_keyed_by_identity() {
        let loader = Arc::new(CountingLoader {
            inner: MemoryLoader::new()
                .with("card", "<i>${content}</i>")
                .with(
                    "page",
                    r#"<use path="card"/><use path="default:card" as="box"/><card>a</card><box>b</box>"#,
                ),
            reads: AtomicUsize::new(0),
        });
        let builder = Builder::new(loader.clone());
        let result = builder.compile("page", &RenderContext::new()).unwrap();
        assert_eq!(result.content, "__write(\"<i>a</i><i>b</i>\")\n");
        assert_eq!(loader.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missing_import_is_merge_error_at_reference() {
        let loader = MemoryLoader::new().with("page", "x\n<include:nope/>");
        let err = Builder::new(Arc::new(loader))
            .compile("page", &RenderContext::new())
            .unwrap_err();
        match err {
            StratumError::MergeError { file, line, message } => {
                assert_eq!(file, "default/page.stm");
                assert_eq!(line, 2);
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_depth_cap() {
        let loader = MemoryLoader::new()
            .with("a", "<include:b/>")
            .with("b", "<include:c/>")
            .with("c", "leaf");
        let mut builder = Builder::new(Arc::new(loader));
        builder.options_mut().max_depth = 2;
        let err = builder.compile("a", &RenderContext::new()).unwrap_err();
        assert!(matches!(err, StratumError::MergeError { ref message, .. } if message.contains("exceeds 2")));
    }

    #[test]
    fn test_context_processor_runs_before_lexing() {
        let loader = MemoryLoader::new().with("page", "<p lang=\"@{locale|en}\"></p>");
        let builder = Builder::new(Arc::new(loader));
        let result = builder
            .compile("page", &RenderContext::new().with("locale", "de"))
            .unwrap();
        assert_eq!(result.content, "__write(\"<p lang=\\\"de\\\"></p>\")\n");
    }
}
