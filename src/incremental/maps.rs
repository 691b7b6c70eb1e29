//! Persistent string-keyed maps used by the incremental context.
//!
//! Each map is one JSON document:
//!
//! ```text
//! { "version": "1", "flushed_at": "...", "entries": { "<key>": <value>, ... } }
//! ```
//!
//! Writes go through a temp file and a rename. Like the lookup store, a map
//! remembers the content token it was loaded from and refuses to flush over
//! a document another writer replaced.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use symproc_core::lookup::LookupSymbol;
use symproc_core::persist::{atomic_write, content_token, format_timestamp, hash_bytes};
use symproc_core::{StorageError, StorageResult};

/// Schema version written to every map document.
pub const MAP_SCHEMA_VERSION: &str = "1";

#[derive(Serialize)]
struct MapDocumentRef<'a, V> {
    version: &'a str,
    flushed_at: String,
    entries: &'a BTreeMap<String, V>,
}

#[derive(Deserialize)]
struct MapDocument<V> {
    version: String,
    entries: BTreeMap<String, V>,
}

/// Symbols defined by each file.
pub type FileToSymbolsMap = PersistentMap<Vec<LookupSymbol>>;

/// Outputs generated from each source.
pub type FileToFilesMap = PersistentMap<Vec<String>>;

/// A sorted map persisted as one JSON document.
#[derive(Debug)]
pub struct PersistentMap<V> {
    path: PathBuf,
    entries: BTreeMap<String, V>,
    base_token: Option<String>,
    dirty: bool,
}

impl<V> PersistentMap<V>
where
    V: Serialize + DeserializeOwned,
{
    /// Load the map at `path`, or start empty if there is none.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut map = PersistentMap {
            path,
            entries: BTreeMap::new(),
            base_token: None,
            dirty: false,
        };
        if map.path.exists() {
            let bytes = fs::read(&map.path)?;
            let document: MapDocument<V> =
                serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                    path: map.path.clone(),
                    reason: e.to_string(),
                })?;
            if document.version != MAP_SCHEMA_VERSION {
                return Err(StorageError::UnsupportedSchema {
                    path: map.path,
                    found: document.version,
                    expected: MAP_SCHEMA_VERSION.to_string(),
                });
            }
            map.entries = document.entries;
            map.base_token = Some(hash_bytes(&bytes));
        }
        debug!(path = %map.path.display(), entries = map.entries.len(), "opened map");
        Ok(map)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn put(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let removed = self.entries.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    /// Write the map if it changed (or was never written).
    pub fn flush(&mut self) -> StorageResult<()> {
        let on_disk = content_token(&self.path)?;
        if on_disk != self.base_token {
            return Err(StorageError::ConcurrentModification {
                expected: self.base_token.clone().unwrap_or_else(|| "<none>".to_string()),
                actual: on_disk.unwrap_or_else(|| "<none>".to_string()),
            });
        }
        if !self.dirty && on_disk.is_some() {
            return Ok(());
        }
        let document = MapDocumentRef {
            version: MAP_SCHEMA_VERSION,
            flushed_at: format_timestamp(SystemTime::now()),
            entries: &self.entries,
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        atomic_write(&self.path, &bytes)?;
        self.base_token = Some(hash_bytes(&bytes));
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "flushed map");
        Ok(())
    }
}

impl FileToFilesMap {
    /// Remove `key` and, transitively, every output generated from it.
    pub fn remove_recursively(&mut self, key: &str) {
        if let Some(outputs) = self.remove(key) {
            for output in outputs {
                self.remove_recursively(&output);
            }
        }
    }
}
