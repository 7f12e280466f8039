// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Stratum project configuration.
//!
//! Configuration is loaded from `stratum.toml` at the project root.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "docs"
//!
//! [views]
//! root = "views"
//!
//! [views.namespaces]
//! mail = "mail"
//!
//! [engine]
//! strict_blocks = true
//!
//! [engine.cache]
//! type = "directory"
//! path = ".stratum/cache"
//!
//! [context]
//! locale = "en"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use stratum::{CacheConfig, Engine, EngineBuilder, EngineConfig, FileSystemLoader, RenderContext};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "stratum.toml";

/// Main configuration structure loaded from `stratum.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Template directories.
    #[serde(default)]
    pub views: ViewsConfig,
    /// Engine settings, passed through to the library.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Default render context values.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Project metadata configuration.
#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    /// Project name (default: "unnamed").
    #[serde(default = "default_name")]
    pub name: String,
}

/// Template directory configuration.
#[derive(Debug, Deserialize)]
pub struct ViewsConfig {
    /// Directory of the default namespace (default: "views").
    #[serde(default = "default_views_root")]
    pub root: String,
    /// Additional namespaces mapped to directories.
    #[serde(default)]
    pub namespaces: BTreeMap<String, String>,
}

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_views_root() -> String {
    "views".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self { name: default_name() }
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            root: default_views_root(),
            namespaces: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if !path.exists() {
            tracing::debug!("No {} found, using defaults", path.display());
            return Ok(Config {
                base_dir,
                ..Config::default()
            });
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.base_dir = base_dir;
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// The template loader over every configured namespace.
    pub fn loader(&self) -> FileSystemLoader {
        let mut loader = self.engine.filesystem_loader(self.resolve(&self.views.root));
        for (namespace, dir) in &self.views.namespaces {
            loader = loader.with_namespace(namespace, self.resolve(dir));
        }
        loader
    }

    /// Builds an engine for this project.
    pub fn engine(&self) -> anyhow::Result<Engine> {
        let mut engine_config = self.engine.clone();
        if let CacheConfig::Directory { path } = &engine_config.cache {
            engine_config.cache = CacheConfig::Directory {
                path: self.resolve(path),
            };
        }
        let engine = EngineBuilder::new(self.loader()).config(engine_config).build()?;
        Ok(engine)
    }

    /// The configured render context with `overrides` applied.
    pub fn render_context(&self, overrides: &[(String, String)]) -> RenderContext {
        self.context
            .iter()
            .chain(overrides.iter().map(|(k, v)| (k, v)))
            .fold(RenderContext::new(), |context, (name, value)| context.with(name.clone(), value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_defaults() {
        let config = Config::parse(
            r#"
[views.namespaces]
mail = "templates/mail"

[engine]
strict_blocks = true

[engine.cache]
type = "directory"
path = ".stratum/cache"

[context]
locale = "en"
"#,
        )
        .unwrap();

        assert_eq!(config.project.name, "unnamed");
        assert_eq!(config.views.root, "views");
        assert_eq!(config.views.namespaces["mail"], "templates/mail");
        assert!(config.engine.strict_blocks);
        assert_eq!(config.engine.extension, "stm");
        assert_eq!(
            config.engine.cache,
            CacheConfig::Directory {
                path: PathBuf::from(".stratum/cache")
            }
        );

        let context = config.render_context(&[("locale".into(), "de".into()), ("theme".into(), "dark".into())]);
        assert_eq!(context.id(), "locale=de,theme=dark");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = Config::load(&temp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.base_dir, temp.path());
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.context.is_empty());
    }

    #[test]
    fn test_unknown_directive_provider_fails_engine() {
        let config = Config::parse("[engine]\ndirectives = [\"nope\"]\n").unwrap();
        assert!(config.engine().is_err());
    }
}
