// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compile command: builds templates and reports failures at their template lines.

use crate::config::Config;
use console::style;
use std::time::Instant;
use stratum::{Engine, RenderContext, View};

/// Compiles each template, keeping going after failures.
pub fn compile_all(engine: &Engine, templates: &[String], context: &RenderContext) -> Vec<(String, stratum::Result<View>)> {
    templates
        .iter()
        .map(|template| (template.clone(), engine.compile(template, context)))
        .collect()
}

/// Runs the compile command.
///
/// With no `templates`, every template of the project is compiled. With
/// `emit`, the generated Lua chunk of each compiled template is printed.
pub fn run(config: &Config, templates: &[String], context: &[(String, String)], emit: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let engine = config.engine()?;
    let render_context = config.render_context(context);
    let templates = if templates.is_empty() {
        engine.list()?
    } else {
        templates.to_vec()
    };

    let mut failed = 0;
    for (template, result) in compile_all(&engine, &templates, &render_context) {
        match result {
            Ok(view) => {
                println!("{} {} ({})", style("✓").green(), template, view.id());
                if emit {
                    println!("{}", view.artifact().source);
                }
            }
            Err(err) => {
                failed += 1;
                eprintln!("{} {}\n  {}", style("✗").red(), template, err);
            }
        }
    }

    println!(
        "{} {} template(s) in {:.2?}",
        style("Compiled").cyan(),
        templates.len() - failed,
        start.elapsed()
    );
    if failed > 0 {
        anyhow::bail!("{} of {} template(s) failed to compile", failed, templates.len());
    }
    Ok(())
}
