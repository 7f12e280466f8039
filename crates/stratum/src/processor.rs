// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Source processors run on template text before lexing.

use crate::context::RenderContext;
use crate::error::{Result, SourceContext, StratumError};
use crate::loader::ViewSource;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::sync::Arc;

lazy_static! {
    static ref CONTEXT_VALUE: Regex =
        Regex::new(r"@\{([A-Za-z_][A-Za-z0-9_.-]*)(?:\|([^}]*))?\}").expect("valid context value pattern");
}

/// Rewrites template source before it is tokenized.
pub trait Processor: Send + Sync {
    /// Returns the processed source of `view`.
    fn process(&self, view: &ViewSource, source: String, context: &RenderContext) -> Result<String>;
}

/// Substitutes `@{name}` and `@{name|default}` with render context values.
#[derive(Debug, Default)]
pub struct ContextProcessor;

impl Processor for ContextProcessor {
    fn process(&self, view: &ViewSource, source: String, context: &RenderContext) -> Result<String> {
        if !source.contains("@{") {
            return Ok(source);
        }

        let mut missing: Option<(String, usize)> = None;
        let replaced = CONTEXT_VALUE.replace_all(&source, |caps: &Captures| {
            let name = &caps[1];
            match (context.get(name), caps.get(2)) {
                (Some(value), _) => value.to_string(),
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => {
                    if missing.is_none() {
                        let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
                        missing = Some((name.to_string(), offset));
                    }
                    String::new()
                }
            }
        });

        if let Some((name, offset)) = missing {
            let line = source[..offset].matches('\n').count() + 1;
            return Err(StratumError::ParseError {
                message: format!("undefined context value `{}`", name),
                file: view.filename.clone(),
                line,
                source_context: Some(SourceContext::from_source(&source, line, 1)),
            });
        }
        Ok(replaced.into_owned())
    }
}

/// Looks up a built-in processor by its configuration name.
pub fn builtin_processor(name: &str) -> Option<Arc<dyn Processor>> {
    match name {
        "context" => Some(Arc::new(ContextProcessor)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewSource {
        ViewSource {
            filename: "views/home.stm".into(),
            namespace: "default".into(),
            name: "home".into(),
        }
    }

    #[test]
    fn test_substitutes_values_and_defaults() {
        let context = RenderContext::new().with("locale", "fr");
        let out = ContextProcessor
            .process(&view(), "<html lang=\"@{locale}\">@{theme|light}".into(), &context)
            .unwrap();
        assert_eq!(out, "<html lang=\"fr\">light");
    }

    #[test]
    fn test_missing_value_is_parse_error() {
        let err = ContextProcessor
            .process(&view(), "a\n@{locale}".into(), &RenderContext::new())
            .unwrap_err();
        assert!(matches!(err, StratumError::ParseError { line: 2, .. }));
    }
}
