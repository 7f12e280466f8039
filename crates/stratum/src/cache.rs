// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compiled artifact caching.
//!
//! A cache entry holds the generated chunk of one template under one render
//! context, its source map, and the modification stamp of every template
//! file it was built from. An entry is fresh while all recorded stamps still
//! match the files on disk.
//!
//! # Cache Implementations
//!
//! - [`MemoryCache`]: in-memory LRU cache
//! - [`FileCache`]: persistent directory cache (`filesystem` feature)
//! - [`NoOpCache`]: never stores anything; every compile starts over
//!
//! Cache failures never fail a compile. They are logged and treated as misses.

use crate::artifact::{Artifact, ArtifactRegistry};
use crate::sourcemap::SourceMap;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;
use thiserror::Error;

#[cfg(feature = "filesystem")]
use std::io::Write;
#[cfg(feature = "filesystem")]
use std::path::PathBuf;

/// Errors raised by cache backends.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Reading or writing an entry failed.
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Entry metadata is missing fields or is not valid JSON.
    #[error("corrupted cache metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// A cache lock was poisoned by a panicking thread.
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Result type of cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cache fingerprint of a template compiled under a render context.
///
/// Each part is hashed with its length ahead of it, so no two distinct
/// triples share an input.
pub fn fingerprint(namespace: &str, name: &str, context_id: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [namespace, name, context_id] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Modification time of a template file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// Whole seconds since the Unix epoch.
    pub secs: u64,
    /// Sub-second nanoseconds.
    pub nanos: u32,
}

impl Stamp {
    /// Current stamp of `path`; `None` when the file does not exist.
    pub fn of<P: AsRef<Path>>(path: P) -> Option<Self> {
        let modified = fs::metadata(path).ok()?.modified().ok()?;
        let elapsed = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(Self {
            secs: elapsed.as_secs(),
            nanos: elapsed.subsec_nanos(),
        })
    }
}

/// A template file an entry was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Template file.
    pub path: String,
    /// Stamp recorded at compile time.
    pub stamp: Option<Stamp>,
}

impl Dependency {
    /// Records the current stamp of `path`.
    pub fn current(path: impl Into<String>) -> Self {
        let path = path.into();
        let stamp = Stamp::of(&path);
        Self { path, stamp }
    }
}

/// One cached compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Fingerprint.
    pub key: String,
    /// Template reference.
    pub template: String,
    /// Generated Lua chunk.
    pub source: String,
    /// Line mapping of `source`.
    pub source_map: SourceMap,
    /// Files the chunk was built from, with their stamps.
    pub dependencies: Vec<Dependency>,
}

impl CacheEntry {
    /// Captures `artifact`, stamping its dependencies now.
    pub fn new(artifact: &Artifact) -> Self {
        Self {
            key: artifact.key.clone(),
            template: artifact.template.clone(),
            source: artifact.source.clone(),
            source_map: artifact.source_map.clone(),
            dependencies: artifact.dependencies.iter().map(Dependency::current).collect(),
        }
    }

    /// True while every dependency still carries its recorded stamp.
    pub fn is_fresh(&self) -> bool {
        self.dependencies
            .iter()
            .all(|dependency| Stamp::of(&dependency.path) == dependency.stamp)
    }

    /// Converts the entry back into a definable artifact.
    pub fn into_artifact(self) -> Artifact {
        let dependencies = self.dependencies.into_iter().map(|d| d.path).collect();
        Artifact::new(self.key, self.template, self.source, self.source_map, dependencies)
    }
}

/// Storage for compiled artifacts.
///
/// Implement this trait for custom backends (shared volumes, key-value
/// stores). Implementations must be thread-safe.
pub trait Cache: Send + Sync + std::fmt::Debug {
    /// Reads the entry stored under `key`.
    fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Stores `entry`, replacing any entry under the same key.
    fn write(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Removes the entry stored under `key`. Missing entries are not an error.
    fn delete(&self, key: &str) -> CacheResult<()>;

    /// True when an entry exists under `key` and is fresh.
    fn is_fresh(&self, key: &str) -> bool {
        match self.read(key) {
            Ok(Some(entry)) => entry.is_fresh(),
            Ok(None) => false,
            Err(err) => {
                tracing::warn!("Ignoring cache entry {}: {}", key, err);
                false
            }
        }
    }

    /// Defines the fresh entry under `key` into `registry`.
    ///
    /// Stale, missing and unreadable entries yield `None`.
    fn load(&self, key: &str, registry: &ArtifactRegistry) -> Option<Arc<Artifact>> {
        let entry = match self.read(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("Ignoring cache entry {}: {}", key, err);
                return None;
            }
        };
        if !entry.is_fresh() {
            tracing::debug!("Cache entry {} for {} is stale", key, entry.template);
            return None;
        }
        tracing::debug!("Cache hit {} for {}", key, entry.template);
        Some(registry.define(entry.into_artifact()))
    }
}

/// In-memory LRU cache.
///
/// # Examples
///
/// ```rust,ignore
/// use stratum::MemoryCache;
///
/// // Keep up to 100 compiled templates
/// let cache = MemoryCache::new(100);
/// ```
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    /// Creates a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Cache for MemoryCache {
    fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, entry: &CacheEntry) -> CacheResult<()> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.put(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.pop(key);
        Ok(())
    }
}

/// Cache that never stores anything.
///
/// Useful during development, where every compile should start from source.
#[derive(Debug, Clone, Default)]
pub struct NoOpCache;

impl Cache for NoOpCache {
    fn read(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(None)
    }

    fn write(&self, _entry: &CacheEntry) -> CacheResult<()> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Metadata {
    key: String,
    template: String,
    source_map: SourceMap,
    dependencies: Vec<Dependency>,
}

/// Persistent cache storing `<key>.lua` and `<key>.meta.json` per entry.
///
/// Files are written through a uniquely named temporary file and renamed
/// into place, the chunk first and the metadata last, so a concurrent reader
/// sees either a complete entry or a miss.
#[cfg(feature = "filesystem")]
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

#[cfg(feature = "filesystem")]
impl FileCache {
    /// Creates a cache in `dir`; the directory is created on first write.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, key: &str, suffix: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}{}", safe_key, suffix))
    }

    fn replace(&self, target: &Path, contents: &str) -> CacheResult<()> {
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(contents.as_bytes())?;
        temp.persist(target).map_err(|err| err.error)?;
        Ok(())
    }
}

#[cfg(feature = "filesystem")]
impl Cache for FileCache {
    fn read(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let meta_file = self.file(key, ".meta.json");
        let source_file = self.file(key, ".lua");
        if !meta_file.is_file() || !source_file.is_file() {
            return Ok(None);
        }

        let metadata: Metadata = serde_json::from_str(&fs::read_to_string(&meta_file)?)?;
        let source = fs::read_to_string(&source_file)?;
        Ok(Some(CacheEntry {
            key: metadata.key,
            template: metadata.template,
            source,
            source_map: metadata.source_map,
            dependencies: metadata.dependencies,
        }))
    }

    fn write(&self, entry: &CacheEntry) -> CacheResult<()> {
        fs::create_dir_all(&self.dir)?;
        let metadata = Metadata {
            key: entry.key.clone(),
            template: entry.template.clone(),
            source_map: entry.source_map.clone(),
            dependencies: entry.dependencies.clone(),
        };
        self.replace(&self.file(&entry.key, ".lua"), &entry.source)?;
        self.replace(&self.file(&entry.key, ".meta.json"), &serde_json::to_string(&metadata)?)?;
        tracing::debug!("Cached {} for {} in {}", entry.key, entry.template, self.dir.display());
        Ok(())
    }

    fn delete(&self, key: &str) -> CacheResult<()> {
        for suffix in [".meta.json", ".lua"] {
            let file = self.file(key, suffix);
            if file.exists() {
                fs::remove_file(&file)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(dependencies: Vec<String>) -> Artifact {
        Artifact::new(
            fingerprint("default", "home", "default"),
            "home",
            "return 1",
            SourceMap::default(),
            dependencies,
        )
    }

    #[test]
    fn test_fingerprint() {
        let key = fingerprint("default", "home", "default");
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(key, fingerprint("default", "home", "locale=en"));
        assert_ne!(fingerprint("a.b", "c", "d"), fingerprint("a", "b.c", "d"));
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new(0);
        let entry = CacheEntry::new(&artifact(vec!["default/home.stm".into()]));
        cache.write(&entry).unwrap();

        assert_eq!(cache.read(&entry.key).unwrap(), Some(entry.clone()));
        // in-memory templates have no file and therefore no stamp
        assert!(cache.is_fresh(&entry.key));

        let registry = ArtifactRegistry::new();
        let loaded = cache.load(&entry.key, &registry).unwrap();
        assert_eq!(loaded.source, "return 1");
        assert_eq!(registry.len(), 1);

        cache.delete(&entry.key).unwrap();
        assert!(cache.read(&entry.key).unwrap().is_none());
        assert!(!cache.is_fresh(&entry.key));
    }

    #[test]
    fn test_noop_cache_never_hits() {
        let cache = NoOpCache;
        let entry = CacheEntry::new(&artifact(Vec::new()));
        cache.write(&entry).unwrap();
        assert!(cache.load(&entry.key, &ArtifactRegistry::new()).is_none());
    }

    #[cfg(feature = "filesystem")]
    #[test]
    fn test_file_cache_freshness_follows_mtime() {
        use std::time::{Duration, SystemTime};

        let temp = tempfile::TempDir::new().unwrap();
        let template = temp.path().join("home.stm");
        fs::write(&template, "hello").unwrap();

        let cache = FileCache::new(temp.path().join("cache"));
        let entry = CacheEntry::new(&artifact(vec![template.to_string_lossy().to_string()]));
        cache.write(&entry).unwrap();

        let reopened = FileCache::new(cache.dir());
        assert_eq!(reopened.read(&entry.key).unwrap(), Some(entry.clone()));
        assert!(reopened.is_fresh(&entry.key));

        let file = fs::File::options().write(true).open(&template).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
        assert!(!reopened.is_fresh(&entry.key));
        assert!(reopened.load(&entry.key, &ArtifactRegistry::new()).is_none());

        reopened.delete(&entry.key).unwrap();
        assert!(reopened.read(&entry.key).unwrap().is_none());
    }

    #[cfg(feature = "filesystem")]
    #[test]
    fn test_file_cache_corrupted_metadata_is_a_miss() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = FileCache::new(temp.path());
        let entry = CacheEntry::new(&artifact(Vec::new()));
        cache.write(&entry).unwrap();
        fs::write(temp.path().join(format!("{}.meta.json", entry.key)), "{not json").unwrap();

        assert!(matches!(cache.read(&entry.key), Err(CacheError::Metadata(_))));
        assert!(!cache.is_fresh(&entry.key));
        assert!(cache.load(&entry.key, &ArtifactRegistry::new()).is_none());
    }

    #[cfg(feature = "filesystem")]
    #[test]
    fn test_file_cache_concurrent_writes_leave_a_complete_entry() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache = Arc::new(FileCache::new(temp.path()));
        let source = format!("return {{ {} }}", "1, ".repeat(4096));
        let entry = CacheEntry::new(&Artifact::new(
            fingerprint("default", "home", "default"),
            "home",
            source,
            SourceMap::default(),
            Vec::new(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let entry = entry.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        cache.write(&entry).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.read(&entry.key).unwrap(), Some(entry));
        let leftovers = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(leftovers, 2);
    }
}
