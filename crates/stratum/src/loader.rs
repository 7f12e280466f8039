// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template location and loading.
//!
//! Templates are referenced as `namespace:name` or plain `name`, which lives
//! in the [`DEFAULT_NAMESPACE`]. Names use `/` as separator and may omit the
//! template extension.
//!
//! # Loader Implementations
//!
//! - [`FileSystemLoader`]: one directory per namespace (`filesystem` feature)
//! - [`MemoryLoader`]: templates held in memory, for tests and embedding

use crate::error::{Result, StratumError};
use std::collections::BTreeMap;
use std::path::Path;

#[cfg(feature = "filesystem")]
use std::{fs, path::PathBuf};

/// Namespace used when a reference does not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Default template file extension.
pub const DEFAULT_EXTENSION: &str = "stm";

/// Converts a path to a string with forward slashes.
#[inline]
pub fn path_to_string<P: AsRef<Path>>(path: P) -> String {
    #[cfg(windows)]
    {
        path.as_ref().to_string_lossy().replace('\\', "/")
    }
    #[cfg(not(windows))]
    {
        path.as_ref().to_string_lossy().to_string()
    }
}

/// A located template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSource {
    /// File the template is read from; used in diagnostics and stamps.
    pub filename: String,
    /// Namespace the template was found in.
    pub namespace: String,
    /// Name inside the namespace, without extension.
    pub name: String,
}

impl ViewSource {
    /// `namespace:name`, the identity used for cycle detection and fingerprints.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }
}

/// Splits a reference into namespace and name, stripping `extension`.
pub fn split_reference(path: &str, extension: &str) -> (String, String) {
    let (namespace, name) = match path.split_once(':') {
        Some((namespace, name)) if !namespace.is_empty() => (namespace, name),
        _ => (DEFAULT_NAMESPACE, path),
    };
    let name = name.trim().trim_start_matches('/');
    let name = name
        .strip_suffix(extension)
        .and_then(|n| n.strip_suffix('.'))
        .unwrap_or(name);
    (namespace.to_string(), name.to_string())
}

fn check_name(path: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StratumError::LoaderError(format!("empty view name in `{}`", path)));
    }
    if name.split('/').any(|segment| segment == ".." || segment == "." || segment.is_empty()) {
        return Err(StratumError::LoaderError(format!(
            "view `{}` escapes its namespace directory",
            path
        )));
    }
    Ok(())
}

/// Locates and reads templates.
pub trait Loader: Send + Sync {
    /// Resolves a reference to a template.
    fn load(&self, path: &str) -> Result<ViewSource>;

    /// Reads the source of a located template.
    fn read(&self, view: &ViewSource) -> Result<String>;

    /// Every template this loader can serve, as `namespace:name`.
    fn list(&self) -> Result<Vec<String>>;
}

/// Loads templates from one directory per namespace.
///
/// # Examples
///
/// ```rust,ignore
/// use stratum::FileSystemLoader;
///
/// let loader = FileSystemLoader::new("./views").with_namespace("mail", "./mail");
/// let view = loader.load("mail:welcome")?; // ./mail/welcome.stm
/// ```
#[cfg(feature = "filesystem")]
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    namespaces: BTreeMap<String, PathBuf>,
    extension: String,
}

#[cfg(feature = "filesystem")]
impl FileSystemLoader {
    /// Creates a loader with `root` as the default namespace directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let mut namespaces = BTreeMap::new();
        namespaces.insert(DEFAULT_NAMESPACE.to_string(), root.as_ref().to_path_buf());
        Self {
            namespaces,
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Adds (or replaces) a namespace directory.
    pub fn with_namespace<P: AsRef<Path>>(mut self, namespace: &str, dir: P) -> Self {
        self.namespaces.insert(namespace.to_string(), dir.as_ref().to_path_buf());
        self
    }

    /// Sets the template file extension (without dot).
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    fn collect(&self, namespace: &str, root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
        let mut entries: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        for path in entries {
            if path.is_dir() {
                self.collect(namespace, root, &path, out)?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Ok(relative) = path.with_extension("").strip_prefix(root) {
                out.push(format!("{}:{}", namespace, path_to_string(relative)));
            }
        }
        Ok(())
    }
}

#[cfg(feature = "filesystem")]
impl Loader for FileSystemLoader {
    fn load(&self, path: &str) -> Result<ViewSource> {
        let (namespace, name) = split_reference(path, &self.extension);
        check_name(path, &name)?;

        let dir = self
            .namespaces
            .get(&namespace)
            .ok_or_else(|| StratumError::LoaderError(format!("undefined namespace `{}` in `{}`", namespace, path)))?;
        let file = dir.join(format!("{}.{}", name, self.extension));
        if !file.is_file() {
            return Err(StratumError::LoaderError(format!(
                "unable to locate view `{}:{}` in {}",
                namespace,
                name,
                dir.display()
            )));
        }

        let canonical = fs::canonicalize(&file)?;
        let canonical_root = fs::canonicalize(dir)?;
        if !canonical.starts_with(&canonical_root) {
            return Err(StratumError::LoaderError(format!(
                "view `{}` escapes its namespace directory",
                path
            )));
        }

        tracing::debug!("Located view {}:{} at {}", namespace, name, canonical.display());
        Ok(ViewSource {
            filename: path_to_string(&canonical),
            namespace,
            name,
        })
    }

    fn read(&self, view: &ViewSource) -> Result<String> {
        fs::read_to_string(&view.filename).map_err(StratumError::IoError)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (namespace, dir) in &self.namespaces {
            if dir.is_dir() {
                self.collect(namespace, dir, dir, &mut out)?;
            }
        }
        Ok(out)
    }
}

/// Holds templates in memory.
///
/// Filenames are reported as `namespace/name.stm`; they do not exist on disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: BTreeMap<String, String>,
}

impl MemoryLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template under `path` (`name` or `namespace:name`).
    pub fn add(&mut self, path: &str, source: impl Into<String>) {
        let (namespace, name) = split_reference(path, DEFAULT_EXTENSION);
        self.templates.insert(format!("{}:{}", namespace, name), source.into());
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, path: &str, source: impl Into<String>) -> Self {
        self.add(path, source);
        self
    }
}

impl Loader for MemoryLoader {
    fn load(&self, path: &str) -> Result<ViewSource> {
        let (namespace, name) = split_reference(path, DEFAULT_EXTENSION);
        check_name(path, &name)?;
        let identity = format!("{}:{}", namespace, name);
        if !self.templates.contains_key(&identity) {
            return Err(StratumError::LoaderError(format!("unable to locate view `{}`", identity)));
        }
        Ok(ViewSource {
            filename: format!("{}/{}.{}", namespace, name, DEFAULT_EXTENSION),
            namespace,
            name,
        })
    }

    fn read(&self, view: &ViewSource) -> Result<String> {
        self.templates
            .get(&view.identity())
            .cloned()
            .ok_or_else(|| StratumError::LoaderError(format!("unable to read view `{}`", view.identity())))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.templates.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("home", "stm"), ("default".into(), "home".into()));
        assert_eq!(
            split_reference("mail:layout/base.stm", "stm"),
            ("mail".into(), "layout/base".into())
        );
        assert_eq!(split_reference("/pages/x", "stm"), ("default".into(), "pages/x".into()));
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryLoader::new().with("home", "hi").with("mail:welcome", "yo");
        let view = loader.load("home.stm").unwrap();
        assert_eq!(view.identity(), "default:home");
        assert_eq!(view.filename, "default/home.stm");
        assert_eq!(loader.read(&view).unwrap(), "hi");
        assert_eq!(loader.list().unwrap(), vec!["default:home", "mail:welcome"]);
        assert!(matches!(loader.load("missing"), Err(StratumError::LoaderError(_))));
    }

    #[test]
    fn test_parent_segments_are_rejected() {
        let loader = MemoryLoader::new();
        assert!(matches!(loader.load("../secret"), Err(StratumError::LoaderError(_))));
    }

    #[cfg(feature = "filesystem")]
    #[test]
    fn test_filesystem_loader_namespaces_and_list() {
        let temp = tempfile::TempDir::new().unwrap();
        let views = temp.path().join("views");
        let mail = temp.path().join("mail");
        fs::create_dir_all(views.join("layout")).unwrap();
        fs::create_dir_all(&mail).unwrap();
        fs::write(views.join("home.stm"), "home").unwrap();
        fs::write(views.join("layout/base.stm"), "base").unwrap();
        fs::write(views.join("notes.txt"), "skip").unwrap();
        fs::write(mail.join("welcome.stm"), "welcome").unwrap();

        let loader = FileSystemLoader::new(&views).with_namespace("mail", &mail);
        let view = loader.load("layout/base").unwrap();
        assert_eq!(view.identity(), "default:layout/base");
        assert_eq!(loader.read(&view).unwrap(), "base");
        assert_eq!(loader.read(&loader.load("mail:welcome").unwrap()).unwrap(), "welcome");
        assert_eq!(
            loader.list().unwrap(),
            vec!["default:home", "default:layout/base", "mail:welcome"]
        );
        assert!(matches!(loader.load("other:x"), Err(StratumError::LoaderError(_))));
    }
}
