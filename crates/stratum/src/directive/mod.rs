// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Directive expansion.
//!
//! A directive (`@name(values)`) is expanded into host code by the first
//! registered [`DirectiveProvider`] that claims its name. Providers are
//! registered in order, so an application provider registered before the
//! built-ins can override them.
//!
//! # Built-in providers
//!
//! | Name          | Directives                                             |
//! |---------------|--------------------------------------------------------|
//! | `conditional` | `if`, `elseif`, `else`, `endif`, `unless`, `endunless`, `isset`, `endisset` |
//! | `loop`        | `foreach`, `endforeach`, `for`, `endfor`, `while`, `endwhile`, `break` |
//! | `json`        | `json`                                                 |
//! | `container`   | `inject`                                               |
//! | `route`       | `route`                                                |
//! | `lua`         | `lua`, `end`                                           |

mod builtin;

pub use builtin::{
    ConditionalDirectives, ContainerDirectives, JsonDirectives, LoopDirectives, LuaDirectives, RouteDirectives,
};

use crate::ast::Directive;
use crate::error::{Result, StratumError};
use std::fmt;
use std::sync::Arc;

/// Names of the built-in providers, in default registration order.
pub const BUILTIN_PROVIDERS: &[&str] = &["conditional", "loop", "json", "container", "route", "lua"];

/// Expands a family of directives into host code.
pub trait DirectiveProvider: Send + Sync {
    /// Directive names this provider handles.
    fn names(&self) -> &'static [&'static str];

    /// Renders `directive` into one or more lines of host code.
    fn render(&self, directive: &Directive) -> Result<String>;
}

/// Builds a [`StratumError::DirectiveError`] located at `directive`.
pub fn directive_error(directive: &Directive, message: impl Into<String>) -> StratumError {
    StratumError::DirectiveError {
        message: format!("@{}: {}", directive.name, message.into()),
        file: directive.context.path.clone(),
        line: directive.context.line,
    }
}

/// Ordered set of directive providers.
#[derive(Clone, Default)]
pub struct DirectiveRegistry {
    providers: Vec<Arc<dyn DirectiveProvider>>,
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRegistry")
            .field("directives", &self.names())
            .finish()
    }
}

impl DirectiveRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in provider.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for name in BUILTIN_PROVIDERS {
            if let Some(provider) = builtin_provider(name) {
                registry.register(provider);
            }
        }
        registry
    }

    /// Creates a registry from built-in provider names, in the given order.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut registry = Self::new();
        for name in names {
            let name = name.as_ref();
            let provider = builtin_provider(name)
                .ok_or_else(|| StratumError::ConfigError(format!("unknown directive provider `{}`", name)))?;
            registry.register(provider);
        }
        Ok(registry)
    }

    /// Appends a provider; earlier providers win on name clashes.
    pub fn register(&mut self, provider: Arc<dyn DirectiveProvider>) {
        self.providers.push(provider);
    }

    /// Inserts a provider ahead of every registered one.
    pub fn register_first(&mut self, provider: Arc<dyn DirectiveProvider>) {
        self.providers.insert(0, provider);
    }

    /// Every directive name handled, in resolution order.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for provider in &self.providers {
            for name in provider.names() {
                if !names.contains(name) {
                    names.push(*name);
                }
            }
        }
        names
    }

    /// Whether some provider handles `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.iter().any(|p| p.names().contains(&name))
    }

    /// Expands `directive` with the first provider claiming its name.
    pub fn render(&self, directive: &Directive) -> Result<String> {
        let provider = self
            .providers
            .iter()
            .find(|p| p.names().contains(&directive.name.as_str()))
            .ok_or_else(|| directive_error(directive, "undefined directive"))?;
        provider.render(directive)
    }
}

/// Looks up a built-in provider by its configuration name.
pub fn builtin_provider(name: &str) -> Option<Arc<dyn DirectiveProvider>> {
    let provider: Arc<dyn DirectiveProvider> = match name {
        "conditional" => Arc::new(ConditionalDirectives),
        "loop" => Arc::new(LoopDirectives),
        "json" => Arc::new(JsonDirectives),
        "container" => Arc::new(ContainerDirectives),
        "route" => Arc::new(RouteDirectives),
        "lua" => Arc::new(LuaDirectives),
        _ => return None,
    };
    Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Context;
    use crate::lexer::Grammar;

    struct Shout;

    impl DirectiveProvider for Shout {
        fn names(&self) -> &'static [&'static str] {
            &["json"]
        }

        fn render(&self, directive: &Directive) -> Result<String> {
            Ok(format!("__write(string.upper({}))", directive.values.join(", ")))
        }
    }

    fn directive(name: &str, values: &[&str]) -> Directive {
        Directive {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            body: Some(values.join(", ")),
            context: Context::new("t.stm", 4, Grammar::Dynamic, format!("@{}", name)),
        }
    }

    #[test]
    fn test_first_provider_wins() {
        let mut registry = DirectiveRegistry::builtin();
        assert_eq!(
            registry.render(&directive("json", &["x"])).unwrap(),
            "__write(__json(x))"
        );
        registry.register_first(Arc::new(Shout));
        assert_eq!(
            registry.render(&directive("json", &["x"])).unwrap(),
            "__write(string.upper(x))"
        );
    }

    #[test]
    fn test_from_names_selects_providers() {
        let registry = DirectiveRegistry::from_names(&["json"]).unwrap();
        assert_eq!(registry.names(), vec!["json"]);
        assert!(matches!(
            registry.render(&directive("if", &["x"])),
            Err(StratumError::DirectiveError { line: 4, .. })
        ));
        assert!(matches!(
            DirectiveRegistry::from_names(&["nope"]),
            Err(StratumError::ConfigError(_))
        ));
    }
}
