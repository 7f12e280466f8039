// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! Stratum CLI library.
//!
//! This crate provides the command-line interface for the Stratum template
//! compiler: compiling a project's templates, rendering one with JSON data,
//! listing templates and resetting cached artifacts.
//!
//! # Usage
//!
//! This crate is primarily used through the `stratum` binary:
//!
//! ```bash
//! stratum compile              # Compile every template
//! stratum render home --json '{"name":"World"}'
//! stratum list                 # List templates as namespace:name
//! stratum reset home           # Drop the cached artifact
//! ```
//!
//! # Configuration
//!
//! Projects are configured via `stratum.toml` at the project root.

/// CLI commands (compile, render, list, reset).
pub mod commands;
/// Project configuration from `stratum.toml`.
pub mod config;
