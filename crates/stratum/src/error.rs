// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the Stratum template compiler.
//!
//! This module defines [`StratumError`], the main error enum, and helper types
//! for rich error reporting with source context.
//!
//! # Error Categories
//!
//! - **Lex errors**: unterminated or unrecognized regions
//! - **Parse errors**: malformed constructs for the active grammar
//! - **Merge errors**: cyclic or unresolvable `extends`/`import` references
//! - **Directive errors**: unknown directive or wrong argument arity
//! - **Compile errors**: umbrella over the four above, carrying the originating file
//! - **Render errors**: runtime failures translated back to template frames
//!
//! Every compile-time error reports the original template file and line,
//! never a line of generated code.

use crate::sourcemap::Frame;
use std::fmt;
use thiserror::Error;

/// Source context for enhanced error messages.
///
/// Captures a snippet of source code around an error location,
/// enabling rich error messages with line numbers and visual indicators.
#[derive(Debug, Clone)]
pub struct SourceContext {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceContext {
    /// Creates a source context from source code and error location.
    ///
    /// Captures 2 lines before and after the error line.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(2).max(1);
        let snippet_end = (line + 2).min(lines.len());

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the source snippet with line numbers and a caret under the error column.
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            if line_num == 0 || line_num > self.lines.len() {
                break;
            }

            result.push_str(&format!("{:4} | {}\n", line_num, self.lines[line_num - 1]));

            if line_num == self.error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

/// Helper struct for displaying optional source context.
pub struct OptSourceContextDisplay<'a>(pub &'a Option<SourceContext>);

impl fmt::Display for OptSourceContextDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ctx) => write!(f, "\n{}", ctx),
            None => Ok(()),
        }
    }
}

/// Helper trait for formatting optional source context.
pub trait AsDisplay<'a> {
    /// Wraps self for Display formatting.
    fn as_display(&'a self) -> OptSourceContextDisplay<'a>;
}

impl<'a> AsDisplay<'a> for Option<SourceContext> {
    fn as_display(&'a self) -> OptSourceContextDisplay<'a> {
        OptSourceContextDisplay(self)
    }
}

/// Renders a frame list one per line, innermost first.
struct FramesDisplay<'a>(&'a [Frame]);

impl fmt::Display for FramesDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in self.0 {
            write!(f, "\n  at {}", frame)?;
        }
        Ok(())
    }
}

/// The main error type for Stratum operations.
#[derive(Error, Debug)]
pub enum StratumError {
    /// Tokenization failed on an unterminated or unrecognized region.
    #[error("Lex error in {file}: {message} at line {line}{}", source_context.as_display())]
    LexError {
        /// Description of the failure.
        message: String,
        /// Template file being tokenized.
        file: String,
        /// Line of the offending region.
        line: usize,
        /// Source snippet for display.
        source_context: Option<SourceContext>,
    },

    /// A construct is malformed for its grammar.
    #[error("Parse error in {file}: {message} at line {line}{}", source_context.as_display())]
    ParseError {
        /// Description of the failure.
        message: String,
        /// Template file being parsed.
        file: String,
        /// Line of the malformed construct.
        line: usize,
        /// Source snippet for display.
        source_context: Option<SourceContext>,
    },

    /// An `extends` or `import` reference is cyclic, too deep, or unresolvable.
    #[error("Merge error in {file}: {message} at line {line}")]
    MergeError {
        /// Description of the failure.
        message: String,
        /// Template holding the reference.
        file: String,
        /// Line of the reference.
        line: usize,
    },

    /// A directive is unknown or was called with invalid arguments.
    #[error("Directive error in {file}: {message} at line {line}")]
    DirectiveError {
        /// Description of the failure.
        message: String,
        /// Template holding the directive.
        file: String,
        /// Line of the directive.
        line: usize,
    },

    /// Compilation of a template failed.
    #[error("Unable to compile {file}: {source}")]
    CompileError {
        /// File the failure originated in.
        file: String,
        /// The underlying failure.
        #[source]
        source: Box<StratumError>,
    },

    /// Execution of a compiled template failed.
    #[error("Render error in {template}: {message}{}", FramesDisplay(frames))]
    RenderError {
        /// Template that was requested by the caller.
        template: String,
        /// Failure message with generated locations translated.
        message: String,
        /// Translated frames, innermost template first.
        frames: Vec<Frame>,
        /// The original Lua failure.
        #[source]
        cause: mlua::Error,
    },

    /// A template could not be located by the loader.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// Engine configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Lua runtime error outside of template execution.
    #[error("Lua error: {0}")]
    LuaError(#[from] mlua::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StratumError {
    /// Wraps a pipeline failure into a [`StratumError::CompileError`].
    ///
    /// The originating file is taken from the failure when it carries one,
    /// otherwise `requested` is used. Already wrapped errors pass through.
    pub fn compile(requested: &str, err: StratumError) -> Self {
        match err {
            err @ StratumError::CompileError { .. } => err,
            err => StratumError::CompileError {
                file: err.origin_file().unwrap_or(requested).to_string(),
                source: Box::new(err),
            },
        }
    }

    /// The template file a compile-time failure originated in.
    pub fn origin_file(&self) -> Option<&str> {
        match self {
            StratumError::LexError { file, .. }
            | StratumError::ParseError { file, .. }
            | StratumError::MergeError { file, .. }
            | StratumError::DirectiveError { file, .. }
            | StratumError::CompileError { file, .. } => Some(file),
            StratumError::RenderError { frames, .. } => frames.first().map(|f| f.file.as_str()),
            _ => None,
        }
    }

    /// The original line of a compile-time failure.
    pub fn origin_line(&self) -> Option<usize> {
        match self {
            StratumError::LexError { line, .. }
            | StratumError::ParseError { line, .. }
            | StratumError::MergeError { line, .. }
            | StratumError::DirectiveError { line, .. } => Some(*line),
            StratumError::CompileError { source, .. } => source.origin_line(),
            StratumError::RenderError { frames, .. } => frames.first().map(|f| f.line),
            _ => None,
        }
    }

    /// Translated frames of a render failure; empty for other errors.
    pub fn frames(&self) -> &[Frame] {
        match self {
            StratumError::RenderError { frames, .. } => frames,
            _ => &[],
        }
    }
}

/// Result type alias for Stratum operations.
pub type Result<T> = std::result::Result<T, StratumError>;
