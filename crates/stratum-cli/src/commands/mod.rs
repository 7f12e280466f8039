// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `compile`: Compile templates and report failures
//! - `render`: Render one template with JSON data
//! - `list`: List every template the project can serve
//! - `reset`: Drop cached artifacts

/// Compile command.
pub mod compile;
/// Template listing command.
pub mod list;
/// Render command.
pub mod render;
/// Cache reset command.
pub mod reset;

use anyhow::bail;

/// Parses `name=value` render context overrides.
pub fn parse_context(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => bail!("invalid context value `{}`, expected name=value", pair),
        })
        .collect()
}
