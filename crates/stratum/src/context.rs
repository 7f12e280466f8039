// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compile-time render context.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Named values a template is compiled against, such as a locale or a theme.
///
/// The same template compiled under two contexts yields two artifacts; the
/// context [`id`](Self::id) is part of the cache fingerprint. Values reach
/// templates through the `context` processor (`@{locale}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderContext {
    dependencies: BTreeMap<String, String>,
}

impl RenderContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with `name` set to `value`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dependencies.insert(name.into(), value.into());
        self
    }

    /// Value of a dependency.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.dependencies.get(name).map(String::as_str)
    }

    /// All dependencies in name order.
    pub fn dependencies(&self) -> &BTreeMap<String, String> {
        &self.dependencies
    }

    /// Stable identifier: `name=value` pairs joined with `,`; `"default"` when empty.
    ///
    /// `%`, `,` and `=` inside names and values are percent-encoded, so two
    /// different contexts never share an id.
    pub fn id(&self) -> String {
        if self.dependencies.is_empty() {
            return "default".to_string();
        }
        self.dependencies
            .iter()
            .map(|(name, value)| format!("{}={}", encode(name), encode(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn encode(part: &str) -> Cow<'_, str> {
    if !part.contains(['%', ',', '=']) {
        return Cow::Borrowed(part);
    }
    let mut encoded = String::with_capacity(part.len() + 4);
    for c in part.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            ',' => encoded.push_str("%2C"),
            '=' => encoded.push_str("%3D"),
            c => encoded.push(c),
        }
    }
    Cow::Owned(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_order_independent() {
        let a = RenderContext::new().with("theme", "dark").with("locale", "en");
        let b = RenderContext::new().with("locale", "en").with("theme", "dark");
        assert_eq!(a.id(), "locale=en,theme=dark");
        assert_eq!(a.id(), b.id());
        assert_eq!(RenderContext::new().id(), "default");
    }

    #[test]
    fn test_id_separates_values_containing_delimiters() {
        let packed = RenderContext::new().with("a", "1,b=2");
        let split = RenderContext::new().with("a", "1").with("b", "2");
        assert_eq!(packed.id(), "a=1%2Cb%3D2");
        assert_eq!(split.id(), "a=1,b=2");
        assert_ne!(RenderContext::new().with("a", "%2C").id(), RenderContext::new().with("a", ",").id());
    }
}
