// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Drops cached artifacts.

use crate::config::Config;
use console::style;

/// Resets `templates`, or every template of the project when empty.
pub fn run(config: &Config, templates: &[String], context: &[(String, String)]) -> anyhow::Result<()> {
    let engine = config.engine()?;
    let render_context = config.render_context(context);
    let templates = if templates.is_empty() {
        engine.list()?
    } else {
        templates.to_vec()
    };

    for template in &templates {
        engine.reset(template, &render_context)?;
        println!("{} {}", style("reset").yellow(), template);
    }
    Ok(())
}
