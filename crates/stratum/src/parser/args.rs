// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Directive argument splitting.

use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "parser/args.pest"]
struct ArgsParser;

/// Splits a directive body into trimmed positional values.
///
/// Commas inside string literals and brackets do not split. An empty or
/// blank body has no values.
pub fn split_values(body: &str) -> std::result::Result<Vec<String>, String> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let pairs = ArgsParser::parse(Rule::values, body).map_err(|e| e.variant.message().to_string())?;

    let values = pairs
        .flat_map(|pair| pair.into_inner())
        .filter(|pair| pair.as_rule() == Rule::value)
        .map(|pair| pair.as_str().trim().to_string())
        .collect();

    Ok(values)
}
