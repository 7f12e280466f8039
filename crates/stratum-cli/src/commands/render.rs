// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Render command: renders one template with JSON data to stdout.

use crate::config::Config;
use anyhow::Context as _;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Reads render data from a JSON file or inline JSON; an empty object otherwise.
pub fn load_data(file: Option<&Path>, inline: Option<&str>) -> anyhow::Result<Value> {
    let text = match (file, inline) {
        (Some(_), Some(_)) => anyhow::bail!("--data and --json are mutually exclusive"),
        (Some(file), None) => fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?,
        (None, Some(inline)) => inline.to_string(),
        (None, None) => return Ok(Value::Object(Default::default())),
    };
    let data: Value = serde_json::from_str(&text).context("render data is not valid JSON")?;
    if !data.is_object() {
        anyhow::bail!("render data must be a JSON object");
    }
    Ok(data)
}

/// Renders `template` with `data`.
pub fn render(config: &Config, template: &str, data: &Value, context: &[(String, String)]) -> anyhow::Result<String> {
    let engine = config.engine()?;
    let view = engine.compile(template, &config.render_context(context))?;
    Ok(view.render(data)?)
}

/// Runs the render command.
pub fn run(
    config: &Config,
    template: &str,
    data_file: Option<&Path>,
    json: Option<&str>,
    context: &[(String, String)],
) -> anyhow::Result<()> {
    let data = load_data(data_file, json)?;
    let html = render(config, template, &data, context)?;
    println!("{}", html);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_data() {
        assert_eq!(load_data(None, None).unwrap(), serde_json::json!({}));
        assert_eq!(load_data(None, Some(r#"{"a":1}"#)).unwrap()["a"], 1);
        assert!(load_data(None, Some("[1]")).is_err());
        assert!(load_data(None, Some("{")).is_err());
    }
}
