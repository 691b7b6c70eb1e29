//! Durable lookup index.
//!
//! Maps (scope, name) to the set of files that looked the symbol up. The
//! store lives in one directory:
//!
//! ```text
//! <dir>/
//! └── lookups.json   # schema version, last flush time, sorted entries
//! ```
//!
//! A reverse index (file -> symbols) is kept in memory only and rebuilt on
//! open, so removing a file touches just that file's entries.
//!
//! # Durability
//!
//! Nothing reaches disk before [`LookupStorage::flush`]. A flush writes the
//! whole document to a temp file and renames it into place, so a crash
//! leaves either the previous or the new document.
//!
//! # Single writer
//!
//! On open the content token of `lookups.json` is remembered. A flush that
//! finds a different token on disk fails with
//! [`StorageError::ConcurrentModification`] instead of overwriting.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use super::{LookupBuffer, LookupSymbol};
use crate::error::{StorageError, StorageResult};
use crate::persist::{atomic_write, content_token, format_timestamp, hash_bytes};

/// Schema version written to `lookups.json`.
pub const LOOKUP_SCHEMA_VERSION: &str = "1";

const LOOKUPS_FILE: &str = "lookups.json";

#[derive(Debug, Serialize, Deserialize)]
struct LookupDocument {
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flushed_at: Option<String>,
    entries: Vec<LookupEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LookupEntry {
    scope: String,
    name: String,
    files: Vec<String>,
}

/// Persisted (scope, name) -> files index for one module build.
#[derive(Debug)]
pub struct LookupStorage {
    dir: PathBuf,
    entries: BTreeMap<LookupSymbol, BTreeSet<String>>,
    by_file: HashMap<String, BTreeSet<LookupSymbol>>,
    /// Files whose stale entries were already replaced during this build.
    refreshed: HashSet<String>,
    /// Content token of the document as last read or written.
    base_token: Option<String>,
    dirty: bool,
}

impl LookupStorage {
    /// Open (or create) the store in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut storage = LookupStorage {
            dir,
            entries: BTreeMap::new(),
            by_file: HashMap::new(),
            refreshed: HashSet::new(),
            base_token: None,
            dirty: false,
        };

        let path = storage.document_path();
        if path.exists() {
            let bytes = fs::read(&path)?;
            let document: LookupDocument =
                serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            if document.version != LOOKUP_SCHEMA_VERSION {
                return Err(StorageError::UnsupportedSchema {
                    path,
                    found: document.version,
                    expected: LOOKUP_SCHEMA_VERSION.to_string(),
                });
            }
            for entry in document.entries {
                let symbol = LookupSymbol::new(entry.name, entry.scope);
                for file in entry.files {
                    storage.insert(symbol.clone(), file);
                }
            }
            storage.base_token = Some(hash_bytes(&bytes));
        }

        debug!(
            dir = %storage.dir.display(),
            symbols = storage.entries.len(),
            "opened lookup storage"
        );
        Ok(storage)
    }

    /// Directory holding the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self) -> PathBuf {
        self.dir.join(LOOKUPS_FILE)
    }

    fn insert(&mut self, symbol: LookupSymbol, file: String) {
        self.by_file
            .entry(file.clone())
            .or_default()
            .insert(symbol.clone());
        self.entries.entry(symbol).or_default().insert(file);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Files that looked up `name` in `scope`.
    pub fn get(&self, name: &str, scope: &str) -> BTreeSet<String> {
        self.entries
            .get(&LookupSymbol::new(name, scope))
            .cloned()
            .unwrap_or_default()
    }

    /// Files that looked up `symbol`.
    pub fn files_for(&self, symbol: &LookupSymbol) -> Option<&BTreeSet<String>> {
        self.entries.get(symbol)
    }

    /// All stored symbols in (scope, name) order.
    pub fn symbols(&self) -> impl Iterator<Item = &LookupSymbol> {
        self.entries.keys()
    }

    /// Symbols looked up by `file`.
    pub fn lookups_of(&self, file: &str) -> Option<&BTreeSet<LookupSymbol>> {
        self.by_file.get(file)
    }

    /// Number of stored symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if there are unflushed changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Merge in-memory records.
    ///
    /// Every entry mentioning a removed file is deleted. The first time a
    /// file is reported compiled in this build its previous entries are
    /// replaced; later updates for the same file union into them. Records
    /// for removed files are ignored.
    pub fn update<'a>(
        &mut self,
        records: &LookupBuffer,
        compiled: impl IntoIterator<Item = &'a str>,
        removed: impl IntoIterator<Item = &'a str>,
    ) {
        let removed: HashSet<&str> = removed.into_iter().collect();
        self.remove_lookups_from(removed.iter().copied());

        let fresh: Vec<&str> = compiled
            .into_iter()
            .filter(|file| !removed.contains(file) && !self.refreshed.contains(*file))
            .collect();
        self.remove_lookups_from(fresh.iter().copied());
        self.refreshed.extend(fresh.iter().map(|f| f.to_string()));

        let mut added = 0usize;
        for (symbol, files) in records.iter() {
            for file in files {
                if removed.contains(file.as_str()) {
                    continue;
                }
                self.insert(symbol.clone(), file.clone());
                added += 1;
            }
        }
        self.dirty = true;
        debug!(
            added,
            removed = removed.len(),
            refreshed = fresh.len(),
            "merged lookup records"
        );
    }

    /// Delete every entry that mentions one of `files`.
    pub fn remove_lookups_from<'a>(&mut self, files: impl IntoIterator<Item = &'a str>) {
        for file in files {
            let Some(symbols) = self.by_file.remove(file) else {
                continue;
            };
            for symbol in symbols {
                let now_empty = match self.entries.get_mut(&symbol) {
                    Some(set) => {
                        set.remove(file);
                        set.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.entries.remove(&symbol);
                }
            }
            self.dirty = true;
        }
    }

    // ========================================================================
    // Durability
    // ========================================================================

    /// Write all merged records to disk.
    pub fn flush(&mut self) -> StorageResult<()> {
        let path = self.document_path();
        let on_disk = content_token(&path)?;
        if on_disk != self.base_token {
            return Err(StorageError::ConcurrentModification {
                expected: self.base_token.clone().unwrap_or_else(|| "<none>".to_string()),
                actual: on_disk.unwrap_or_else(|| "<none>".to_string()),
            });
        }
        if !self.dirty && on_disk.is_some() {
            return Ok(());
        }

        let document = LookupDocument {
            version: LOOKUP_SCHEMA_VERSION.to_string(),
            flushed_at: Some(format_timestamp(SystemTime::now())),
            entries: self
                .entries
                .iter()
                .map(|(symbol, files)| LookupEntry {
                    scope: symbol.scope.clone(),
                    name: symbol.name.clone(),
                    files: files.iter().cloned().collect(),
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        atomic_write(&path, &bytes)?;
        self.base_token = Some(hash_bytes(&bytes));
        self.dirty = false;
        debug!(path = %path.display(), symbols = self.entries.len(), "flushed lookup storage");
        Ok(())
    }

    /// Flush and release the store.
    pub fn close(mut self) -> StorageResult<()> {
        self.flush()
    }
}
