// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compiled artifacts and the process-wide artifact registry.
//!
//! An [`Artifact`] is the unit the engine materializes into a Lua state. Its
//! id combines the cache fingerprint with a digest of the generated source,
//! so recompiling an unchanged template yields the same id and defining it
//! again is a no-op.

use crate::sourcemap::SourceMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lowercase hex SHA-256 of `input`.
pub fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Artifact id: fingerprint prefix and source digest prefix.
pub fn artifact_id(key: &str, source: &str) -> String {
    let prefix: String = key.chars().take(32).collect();
    let digest = sha256_hex(source);
    format!("{}_{}", prefix, &digest[..12])
}

/// A compiled template ready to be materialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Unique id; also the Lua chunk name.
    pub id: String,
    /// Cache fingerprint of template and render context.
    pub key: String,
    /// Template reference the artifact was compiled from.
    pub template: String,
    /// Complete Lua chunk, runtime prelude included.
    pub source: String,
    /// Chunk line to template location mapping.
    pub source_map: SourceMap,
    /// Template files the artifact was built from.
    pub dependencies: Vec<String>,
}

impl Artifact {
    /// Creates an artifact, deriving its id from `key` and `source`.
    pub fn new(
        key: impl Into<String>,
        template: impl Into<String>,
        source: impl Into<String>,
        source_map: SourceMap,
        dependencies: Vec<String>,
    ) -> Self {
        let key = key.into();
        let source = source.into();
        Self {
            id: artifact_id(&key, &source),
            key,
            template: template.into(),
            source,
            source_map,
            dependencies,
        }
    }
}

#[derive(Debug, Default)]
struct Definitions {
    by_id: HashMap<String, Arc<Artifact>>,
    latest: HashMap<String, String>,
}

/// Thread-safe set of defined artifacts.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    definitions: Mutex<Definitions>,
}

impl ArtifactRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Definitions> {
        self.definitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Defines `artifact`, returning the registered instance.
    ///
    /// Defining an id that already exists returns the existing artifact and
    /// leaves the registry unchanged apart from the latest-by-key pointer.
    pub fn define(&self, artifact: Artifact) -> Arc<Artifact> {
        let mut definitions = self.lock();
        definitions.latest.insert(artifact.key.clone(), artifact.id.clone());
        if let Some(existing) = definitions.by_id.get(&artifact.id) {
            return existing.clone();
        }
        tracing::debug!("Defined artifact {} for {}", artifact.id, artifact.template);
        let artifact = Arc::new(artifact);
        definitions.by_id.insert(artifact.id.clone(), artifact.clone());
        artifact
    }

    /// Artifact by id.
    pub fn get(&self, id: &str) -> Option<Arc<Artifact>> {
        self.lock().by_id.get(id).cloned()
    }

    /// Most recently defined artifact for a fingerprint.
    pub fn latest(&self, key: &str) -> Option<Arc<Artifact>> {
        let definitions = self.lock();
        let id = definitions.latest.get(key)?;
        definitions.by_id.get(id).cloned()
    }

    /// Drops the latest-by-key pointer so the next compile of `key` starts over.
    pub fn forget(&self, key: &str) {
        self.lock().latest.remove(key);
    }

    /// Number of defined artifacts.
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    /// Returns true if nothing was defined yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn artifact(source: &str) -> Artifact {
        Artifact::new(sha256_hex("default.home.default"), "home", source, SourceMap::default(), Vec::new())
    }

    #[test]
    fn test_id_depends_on_source() {
        let a = artifact("return 1");
        assert_eq!(a.id.len(), 32 + 1 + 12);
        assert_eq!(a.id, artifact("return 1").id);
        assert_ne!(a.id, artifact("return 2").id);
    }

    #[test]
    fn test_define_is_idempotent_across_threads() {
        let registry = Arc::new(ArtifactRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.define(artifact("return 1")))
            })
            .collect();
        let defined: Vec<Arc<Artifact>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.len(), 1);
        assert!(defined.iter().all(|a| Arc::ptr_eq(a, &defined[0])));
        assert!(Arc::ptr_eq(&registry.latest(&defined[0].key).unwrap(), &defined[0]));
    }

    #[test]
    fn test_latest_follows_redefinition() {
        let registry = ArtifactRegistry::new();
        let first = registry.define(artifact("return 1"));
        let second = registry.define(artifact("return 2"));
        assert_eq!(registry.latest(&first.key).unwrap().id, second.id);
        registry.forget(&first.key);
        assert!(registry.latest(&first.key).is_none());
        assert!(registry.get(&first.id).is_some());
    }
}
