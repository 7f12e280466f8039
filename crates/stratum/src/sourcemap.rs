// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Mapping from generated Lua lines back to template locations.
//!
//! Every line of a compiled artifact that came from a template node is
//! recorded with the node's [`Context`], including its origin chain. When a
//! template was spliced in through an import or an extends, the chain leads
//! back through each referencing element, so a single generated line can be
//! unrolled into a stack of template frames.

use crate::ast::Context;
use crate::lexer::Grammar;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    static ref GENERATED_LINE: Regex = Regex::new(r":(\d+):").expect("valid line pattern");
}

/// Template location of a generated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Template file.
    pub file: String,
    /// 1-based line in `file`.
    pub line: usize,
    /// Grammar that produced the construct.
    pub grammar: Grammar,
    /// Short label of the construct.
    pub label: String,
    /// Location that referenced `file`, if it was spliced in.
    pub parent: Option<Box<Mapping>>,
}

impl From<&Context> for Mapping {
    fn from(context: &Context) -> Self {
        Self {
            file: context.path.clone(),
            line: context.line,
            grammar: context.grammar,
            label: context.label.clone(),
            parent: context.parent.as_deref().map(|p| Box::new(Mapping::from(p))),
        }
    }
}

/// One template frame of a translated failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Template file.
    pub file: String,
    /// 1-based line in `file`.
    pub line: usize,
    /// Construct label, such as `{{` or `<extends:layout>`.
    pub label: String,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.file, self.line, self.label)
    }
}

/// Line mappings of one compiled artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMap {
    /// Every template file that contributed to the artifact.
    pub paths: Vec<String>,
    lines: BTreeMap<usize, Mapping>,
}

impl SourceMap {
    /// Creates an empty map over `paths`.
    pub fn new(paths: Vec<String>) -> Self {
        Self {
            paths,
            lines: BTreeMap::new(),
        }
    }

    /// Records that generated `line` (1-based) came from `context`.
    pub fn record(&mut self, line: usize, context: &Context) {
        self.lines.insert(line, Mapping::from(context));
    }

    /// Number of mapped lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns true if no line is mapped.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Mapping of a generated line.
    ///
    /// Unmapped lines resolve to the closest mapped line above them, as
    /// multi-line host code is recorded at its first line only.
    pub fn find(&self, line: usize) -> Option<&Mapping> {
        self.lines.range(..=line).next_back().map(|(_, mapping)| mapping)
    }

    /// Template frames of a generated line, innermost first.
    ///
    /// Unrolling stops after the first frame located in `root`, the
    /// template the caller asked for.
    pub fn frames(&self, line: usize, root: &str) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut current = self.find(line);
        while let Some(mapping) = current {
            frames.push(Frame {
                file: mapping.file.clone(),
                line: mapping.line,
                label: mapping.label.clone(),
            });
            if mapping.file == root {
                break;
            }
            current = mapping.parent.as_deref();
        }
        frames
    }

    /// Shifts every mapped line down by `delta`.
    ///
    /// Used after the artifact body is wrapped into the runtime prelude.
    pub fn adjust_offsets(&mut self, delta: usize) {
        self.lines = std::mem::take(&mut self.lines)
            .into_iter()
            .map(|(line, mapping)| (line + delta, mapping))
            .collect();
    }

    /// Rewrites `chunk:LINE:` locations in a Lua message into `file:line:`.
    pub fn translate<'m>(&self, message: &'m str, chunk: &str) -> Cow<'m, str> {
        let pattern = format!("{}{}", regex::escape(chunk), GENERATED_LINE.as_str());
        let Ok(re) = Regex::new(&pattern) else {
            return Cow::Borrowed(message);
        };
        re.replace_all(message, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|line| self.lines.get(&line).or_else(|| self.find(line)))
                .map(|mapping| format!("{}:{}:", mapping.file, mapping.line))
                .unwrap_or_else(|| caps[0].to_string())
        })
    }

    /// First generated line mentioned in `message` for `chunk` that maps to a template.
    pub fn locate(&self, message: &str, chunk: &str) -> Option<usize> {
        let pattern = format!("{}{}", regex::escape(chunk), GENERATED_LINE.as_str());
        let re = Regex::new(&pattern).ok()?;
        let found = re
            .captures_iter(message)
            .filter_map(|caps| caps[1].parse::<usize>().ok())
            .find(|line| self.find(*line).is_some());
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(path: &str, line: usize, label: &str) -> Context {
        Context::new(path, line, Grammar::Dynamic, label)
    }

    #[test]
    fn test_find_falls_back_to_previous_line() {
        let mut map = SourceMap::new(vec!["a.stm".into()]);
        map.record(3, &context("a.stm", 10, "{{"));
        assert_eq!(map.find(3).map(|m| m.line), Some(10));
        assert_eq!(map.find(5).map(|m| m.line), Some(10));
        assert!(map.find(2).is_none());
    }

    #[test]
    fn test_frames_unroll_origin_chain() {
        let mut ctx = context("partial.stm", 2, "{{");
        ctx.attach(&context("page.stm", 5, "<card>"));
        ctx.attach(&context("outer.stm", 1, "<include:page>"));

        let mut map = SourceMap::default();
        map.record(7, &ctx);

        let frames = map.frames(7, "page.stm");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].to_string(), "partial.stm:2 ({{)");
        assert_eq!(frames[1].file, "page.stm");
        assert_eq!(frames[1].line, 5);

        assert_eq!(map.frames(7, "elsewhere.stm").len(), 3);
    }

    #[test]
    fn test_adjust_offsets_and_translate() {
        let mut map = SourceMap::default();
        map.record(1, &context("views/home.stm", 4, "{{"));
        map.adjust_offsets(20);
        assert!(map.find(1).is_none());

        let message = "[string \"@home_abc\"]:21: attempt to index a nil value";
        assert_eq!(
            map.translate("@home_abc:21: attempt to index a nil value", "@home_abc"),
            "views/home.stm:4: attempt to index a nil value"
        );
        assert_eq!(map.locate("home_abc:21: boom", "home_abc"), Some(21));
        assert_eq!(map.locate(message, "other"), None);
    }
}
