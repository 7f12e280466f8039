// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stratum_cli::commands::{self, parse_context};
use stratum_cli::config::{Config, CONFIG_FILE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Layered HTML-aware template compiler targeting Lua", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Project configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Render context value as name=value (repeatable)
    #[arg(long = "context", global = true)]
    context: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile templates (all templates when none are given)
    Compile {
        /// Templates as namespace:name or name
        templates: Vec<String>,
        /// Print the generated Lua chunk
        #[arg(long)]
        emit: bool,
    },
    /// Render a template to stdout
    Render {
        /// Template as namespace:name or name
        template: String,
        /// JSON file with render data
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Inline JSON render data
        #[arg(long)]
        json: Option<String>,
    },
    /// List every template of the project
    List,
    /// Drop cached artifacts (all templates when none are given)
    Reset {
        /// Templates as namespace:name or name
        templates: Vec<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&cli.config)?;
    let context = parse_context(&cli.context)?;

    match cli.command {
        Commands::Compile { templates, emit } => commands::compile::run(&config, &templates, &context, emit),
        Commands::Render { template, data, json } => {
            commands::render::run(&config, &template, data.as_deref(), json.as_deref(), &context)
        }
        Commands::List => commands::list::run(&config),
        Commands::Reset { templates } => commands::reset::run(&config, &templates, &context),
    }
}
