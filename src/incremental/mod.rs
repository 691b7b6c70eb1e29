//! Incremental processing across builds.
//!
//! The context persists everything needed to decide which inputs a later
//! build must process again. Layout under `caches_dir`:
//!
//! ```text
//! <caches_dir>/
//! ├── symbolLookups/lookups.json   # (scope, name) -> files, finest granularity
//! ├── classLookups/lookups.json    # the same records coarsened to classes
//! ├── symbols.json                 # file -> symbols it defines
//! ├── sourceToOutputs.json         # source -> generated files
//! ├── caches.uptodate              # written last; absent means rebuild
//! └── logs/                        # optional dirty-set and output logs
//! ```
//!
//! A build reads the caches in [`IncrementalContext::calc_dirty_files`] and
//! only writes them in [`IncrementalContext::update_caches`], after all rounds
//! succeeded. The marker is removed before and recreated after the update,
//! so an interrupted update forces a full rebuild next time.

pub mod maps;
pub mod propagate;

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use symproc_core::lookup::{
    ClassLookupTracker, DualLookupTracker, LookupStorage, LookupSymbol, LookupTracker, ScopeKind,
    SharedTracker,
};
use symproc_core::persist::format_timestamp;
use symproc_core::raw::Modifier;
use symproc_core::visitor::{accept, Visitor};
use symproc_core::{LookupResult, NodeId, NodeKind, Session, StorageResult};

use crate::config::{relative_path, ProcessingConfig};
use crate::processing::GeneratedFile;

use maps::{FileToFilesMap, FileToSymbolsMap};
use propagate::DirtinessPropagator;

/// Source key for outputs that depend on every input.
pub const ANY_CHANGES_KEY: &str = "<any-changes>";

/// Source key listing outputs that disappeared in the previous build.
pub const REMOVED_OUTPUTS_KEY: &str = "<removed-outputs>";

const UP_TO_DATE_MARKER: &str = "caches.uptodate";
const SYMBOL_LOOKUPS_DIR: &str = "symbolLookups";
const CLASS_LOOKUPS_DIR: &str = "classLookups";
const SYMBOLS_FILE: &str = "symbols.json";
const SOURCE_TO_OUTPUTS_FILE: &str = "sourceToOutputs.json";
const LOGS_DIR: &str = "logs";

// ============================================================================
// Defined symbols
// ============================================================================

/// Collects the non-private declarations other files can see.
#[derive(Default)]
struct DefinedSymbols {
    symbols: BTreeSet<LookupSymbol>,
}

impl Visitor<(), ()> for DefinedSymbols {
    fn default_handler(&mut self, _: &Session, _: NodeId, _: &()) {}

    fn visit_declaration(&mut self, s: &Session, node: NodeId, _: &()) {
        if s.modifiers(node).contains(&Modifier::Private) {
            return;
        }
        if let Some(qualified) = s.qualified_name(node) {
            self.symbols.insert(LookupSymbol::from_fqn(&qualified));
        }
    }

    fn visit_declaration_container(&mut self, s: &Session, node: NodeId, _: &()) {
        // Function locals are invisible outside the body.
        if s.kind(node) == NodeKind::Function {
            return;
        }
        for child in s.declarations(node) {
            accept(self, s, child, &());
        }
    }
}

fn defined_symbols(s: &Session, file: NodeId) -> BTreeSet<LookupSymbol> {
    let mut collector = DefinedSymbols::default();
    accept(&mut collector, s, file, &());
    collector.symbols
}

// ============================================================================
// Path keys
// ============================================================================

/// Records lookups under file paths relative to the project base dir.
struct RelativeTracker<T> {
    base_dir: PathBuf,
    inner: T,
}

impl<T: LookupTracker> LookupTracker for RelativeTracker<T> {
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()> {
        let file = relative_path(&self.base_dir, file);
        self.inner.record(&file, scope, kind, name)
    }
}

// ============================================================================
// IncrementalContext
// ============================================================================

/// Persistent dependency state of one module.
///
/// Every persisted file key is relative to the project base dir, whatever
/// form the input paths take.
pub struct IncrementalContext {
    caches_dir: PathBuf,
    base_dir: PathBuf,
    rebuild: bool,
    incremental_log: bool,
    build_time: String,

    modified: BTreeSet<String>,
    removed: BTreeSet<String>,
    changed_classes: Vec<String>,

    symbol_lookups: LookupStorage,
    class_lookups: LookupStorage,
    symbols: FileToSymbolsMap,
    source_to_outputs: FileToFilesMap,

    symbol_tracker: SharedTracker,
    class_tracker: SharedTracker,

    /// Symbols defined by files analyzed in this build.
    updated_symbols: BTreeMap<String, BTreeSet<LookupSymbol>>,
    /// Every file generated in this build.
    outputs: BTreeSet<String>,
    /// Source -> outputs generated from it in this build.
    reprocessed: BTreeMap<String, BTreeSet<String>>,
}

impl IncrementalContext {
    /// Open the caches of the module described by `config`.
    pub fn open(config: &ProcessingConfig) -> StorageResult<Self> {
        let caches_dir = config.caches_dir.clone();
        fs::create_dir_all(&caches_dir)?;
        let rebuild = !caches_dir.join(UP_TO_DATE_MARKER).exists();

        let context = IncrementalContext {
            rebuild,
            base_dir: config.project_base_dir.clone(),
            incremental_log: config.incremental_log,
            build_time: format_timestamp(SystemTime::now()),
            modified: config
                .modified_sources
                .iter()
                .map(|p| config.relative_source(p))
                .collect(),
            removed: config
                .removed_sources
                .iter()
                .map(|p| config.relative_source(p))
                .collect(),
            changed_classes: config.changed_classes.clone(),
            symbol_lookups: LookupStorage::open(caches_dir.join(SYMBOL_LOOKUPS_DIR))?,
            class_lookups: LookupStorage::open(caches_dir.join(CLASS_LOOKUPS_DIR))?,
            symbols: FileToSymbolsMap::open(caches_dir.join(SYMBOLS_FILE))?,
            source_to_outputs: FileToFilesMap::open(caches_dir.join(SOURCE_TO_OUTPUTS_FILE))?,
            symbol_tracker: SharedTracker::new(),
            class_tracker: SharedTracker::new(),
            updated_symbols: BTreeMap::new(),
            outputs: BTreeSet::new(),
            reprocessed: BTreeMap::new(),
            caches_dir,
        };
        info!(
            caches = %context.caches_dir.display(),
            rebuild,
            modified = context.modified.len(),
            removed = context.removed.len(),
            "opened incremental context"
        );
        Ok(context)
    }

    /// True if the caches were missing or stale and everything is processed.
    pub fn is_rebuild(&self) -> bool {
        self.rebuild
    }

    /// Tracker feeding both lookup stores, for installing into the session.
    pub fn tracker(&self) -> Box<dyn LookupTracker> {
        Box::new(RelativeTracker {
            base_dir: self.base_dir.clone(),
            inner: DualLookupTracker::new(
                self.symbol_tracker.clone(),
                ClassLookupTracker::new(self.class_tracker.clone()),
            ),
        })
    }

    /// Persisted key of an input or output path.
    fn key(&self, path: &str) -> String {
        relative_path(&self.base_dir, path)
    }

    fn file_key(&self, s: &Session, file: NodeId) -> Option<String> {
        s.file_path(file).map(|path| self.key(&path))
    }

    // ------------------------------------------------------------------------
    // Dirty set
    // ------------------------------------------------------------------------

    /// The subset of `files` that must be processed in this build.
    ///
    /// Persisted state is not written here; symbols defined by modified
    /// files are remembered for [`update_caches`](Self::update_caches).
    pub fn calc_dirty_files(&mut self, s: &Session, files: &[NodeId]) -> Vec<NodeId> {
        let paths: Vec<(NodeId, String)> = files
            .iter()
            .filter_map(|&file| self.file_key(s, file).map(|path| (file, path)))
            .collect();

        if self.rebuild {
            for (file, path) in &paths {
                self.updated_symbols.insert(path.clone(), defined_symbols(s, *file));
            }
            self.log_dirty_set(&paths, &paths, &DirtyReasons::default());
            debug!(dirty = paths.len(), "rebuild: every file is dirty");
            return files.to_vec();
        }

        // Files no earlier build analyzed are new, hence modified.
        for (_, path) in &paths {
            if !self.symbols.contains_key(path) && !self.modified.contains(path) {
                debug!(path = %path, "unknown file treated as modified");
                self.modified.insert(path.clone());
            }
        }

        let mut new_symbols = BTreeSet::new();
        for (file, path) in &paths {
            if self.modified.contains(path) {
                let defined = defined_symbols(s, *file);
                new_symbols.extend(defined.iter().cloned());
                self.updated_symbols.insert(path.clone(), defined);
            }
        }

        let mut reasons = DirtyReasons::default();
        for symbol in &new_symbols {
            reasons
                .by_new_symbols
                .extend(self.symbol_lookups.get(&symbol.name, &symbol.scope));
        }
        for fqn in &self.changed_classes {
            let symbol = LookupSymbol::from_fqn(fqn);
            reasons
                .by_classpath
                .extend(self.class_lookups.get(&symbol.name, &symbol.scope));
            reasons
                .by_classpath
                .extend(self.symbol_lookups.get(&symbol.name, &symbol.scope));
        }
        reasons.removed_outputs = self
            .source_to_outputs
            .get(REMOVED_OUTPUTS_KEY)
            .cloned()
            .unwrap_or_default();

        let mut initial: BTreeSet<String> = BTreeSet::new();
        initial.extend(self.modified.iter().cloned());
        initial.extend(self.removed.iter().cloned());
        initial.extend(reasons.removed_outputs.iter().cloned());
        initial.extend(reasons.by_classpath.iter().cloned());
        initial.extend(reasons.by_new_symbols.iter().cloned());
        if !self.modified.is_empty() || !self.changed_classes.is_empty() {
            initial.insert(ANY_CHANGES_KEY.to_string());
        }

        let dirty = DirtinessPropagator::new(
            &self.symbol_lookups,
            &self.symbols,
            &self.source_to_outputs,
            &[ANY_CHANGES_KEY, REMOVED_OUTPUTS_KEY],
        )
        .propagate(initial);

        self.forget_removed_outputs();

        let dirty_paths: Vec<(NodeId, String)> = paths
            .iter()
            .filter(|(_, path)| dirty.contains(path))
            .cloned()
            .collect();
        debug!(
            all = paths.len(),
            dirty = dirty_paths.len(),
            by_new_symbols = reasons.by_new_symbols.len(),
            by_classpath = reasons.by_classpath.len(),
            files = ?dirty_paths.iter().map(|(_, p)| p.as_str()).collect::<Vec<_>>(),
            "computed dirty files"
        );
        self.log_dirty_set(&dirty_paths, &paths, &reasons);
        dirty_paths.into_iter().map(|(file, _)| file).collect()
    }

    /// Drop what the previous build recorded for outputs that are gone.
    fn forget_removed_outputs(&mut self) {
        let Some(removed_outputs) = self.source_to_outputs.get(REMOVED_OUTPUTS_KEY).cloned() else {
            return;
        };
        let removed = removed_outputs.iter().map(String::as_str);
        self.symbol_lookups.remove_lookups_from(removed.clone());
        self.class_lookups.remove_lookups_from(removed);
        for output in &removed_outputs {
            self.symbols.remove(output);
        }
        self.source_to_outputs.remove_recursively(REMOVED_OUTPUTS_KEY);
    }

    // ------------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------------

    /// Remember the symbols defined by files generated in this build.
    pub fn register_generated_files(&mut self, s: &Session, files: &[NodeId]) {
        for &file in files {
            if let Some(path) = self.file_key(s, file) {
                self.updated_symbols.insert(path, defined_symbols(s, file));
            }
        }
    }

    /// Record the source -> output associations of generated files.
    pub fn record_outputs(&mut self, generated: &[GeneratedFile]) {
        for output in generated {
            let path = self.key(output.path());
            self.outputs.insert(path.clone());
            if output.aggregating || output.sources.is_empty() {
                self.reprocessed
                    .entry(ANY_CHANGES_KEY.to_string())
                    .or_default()
                    .insert(path.clone());
            }
            for source in &output.sources {
                let source = self.key(source);
                self.reprocessed
                    .entry(source)
                    .or_default()
                    .insert(path.clone());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Persist the state of a successful build.
    ///
    /// `dirty` are the paths processed in this build (dirty sources and
    /// generated files), `all_files` every input path.
    pub fn update_caches(
        mut self,
        dirty: &BTreeSet<String>,
        all_files: &BTreeSet<String>,
    ) -> StorageResult<()> {
        let dirty: BTreeSet<String> = dirty.iter().map(|path| self.key(path)).collect();
        let all_files: BTreeSet<String> = all_files.iter().map(|path| self.key(path)).collect();
        let marker = self.caches_dir.join(UP_TO_DATE_MARKER);
        match fs::remove_file(&marker) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.update_source_to_outputs(&dirty)?;
        self.update_lookups(&dirty, &all_files)?;
        self.update_symbols()?;

        fs::write(&marker, b"")?;
        info!(
            caches = %self.caches_dir.display(),
            processed = dirty.len(),
            outputs = self.outputs.len(),
            "updated incremental caches"
        );
        Ok(())
    }

    fn update_source_to_outputs(&mut self, dirty: &BTreeSet<String>) -> StorageResult<()> {
        // Outputs that dirty sources produced last time but not this time.
        let removed_outputs: BTreeSet<String> = dirty
            .iter()
            .filter_map(|source| self.source_to_outputs.get(source))
            .flatten()
            .filter(|output| !self.outputs.contains(*output))
            .cloned()
            .collect();

        for source in &self.removed {
            self.source_to_outputs.remove_recursively(source);
        }
        for source in dirty {
            if !self.reprocessed.contains_key(source) {
                self.source_to_outputs.remove_recursively(source);
            }
        }
        for output in &removed_outputs {
            self.source_to_outputs.remove_recursively(output);
        }
        self.source_to_outputs
            .put(REMOVED_OUTPUTS_KEY, removed_outputs.into_iter().collect());
        for (source, outputs) in &self.reprocessed {
            self.source_to_outputs
                .put(source.clone(), outputs.iter().cloned().collect());
        }

        self.log_source_to_outputs();
        self.source_to_outputs.flush()
    }

    fn update_lookups(
        &mut self,
        dirty: &BTreeSet<String>,
        all_files: &BTreeSet<String>,
    ) -> StorageResult<()> {
        self.symbol_tracker.seal();
        self.class_tracker.seal();

        let compiled = dirty.iter().map(String::as_str);
        let removed = self.removed.iter().map(String::as_str);
        self.symbol_lookups
            .update(&self.symbol_tracker.buffer(), compiled.clone(), removed.clone());
        self.class_lookups
            .update(&self.class_tracker.buffer(), compiled, removed);

        if self.rebuild {
            for storage in [&mut self.symbol_lookups, &mut self.class_lookups] {
                prune_unknown_files(storage, all_files);
            }
        }

        self.symbol_lookups.flush()?;
        self.class_lookups.flush()
    }

    fn update_symbols(&mut self) -> StorageResult<()> {
        if self.rebuild {
            self.symbols.clear();
        } else {
            for removed in &self.removed {
                self.symbols.remove(removed);
            }
        }
        for (path, symbols) in &self.updated_symbols {
            self.symbols.put(path.clone(), symbols.iter().cloned().collect());
        }
        self.symbols.flush()
    }

    // ------------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------------

    fn log_dirty_set(
        &self,
        dirty: &[(NodeId, String)],
        all: &[(NodeId, String)],
        reasons: &DirtyReasons,
    ) {
        if !self.incremental_log {
            return;
        }
        let mut out = format!("=== Build {} ===\n", self.build_time);
        section(&mut out, "All files", all.iter().map(|(_, p)| p.as_str()));
        section(&mut out, "Modified", self.modified.iter().map(String::as_str));
        section(&mut out, "Removed", self.removed.iter().map(String::as_str));
        section(
            &mut out,
            "Disappeared outputs",
            reasons.removed_outputs.iter().map(String::as_str),
        );
        section(
            &mut out,
            "Affected by classpath",
            reasons.by_classpath.iter().map(String::as_str),
        );
        section(
            &mut out,
            "Affected by new symbols",
            reasons.by_new_symbols.iter().map(String::as_str),
        );
        section(&mut out, "Classpath changes", self.changed_classes.iter().map(String::as_str));
        section(&mut out, "Dirty", dirty.iter().map(|(_, p)| p.as_str()));
        let percentage = if all.is_empty() {
            0.0
        } else {
            dirty.len() as f64 / all.len() as f64 * 100.0
        };
        out.push_str(&format!("\nDirty / All: {percentage:.2}%\n\n"));
        self.append_log("dirtySet.log", &out);
    }

    fn log_source_to_outputs(&self) {
        if !self.incremental_log {
            return;
        }
        let mut out = format!("=== Build {} ===\n", self.build_time);
        out.push_str("Accumulated source to outputs map\n");
        for (source, outputs) in self.source_to_outputs.iter() {
            out.push_str(&format!("  {source}:\n"));
            for output in outputs {
                out.push_str(&format!("    {output}\n"));
            }
        }
        out.push_str("\nReprocessed sources and their outputs\n");
        for (source, outputs) in &self.reprocessed {
            out.push_str(&format!("  {source}:\n"));
            for output in outputs {
                out.push_str(&format!("    {output}\n"));
            }
        }
        section(&mut out, "\nAll reprocessed outputs", self.outputs.iter().map(String::as_str));
        out.push('\n');
        self.append_log("sourceToOutputs.log", &out);
    }

    fn append_log(&self, name: &str, text: &str) {
        let path = self.caches_dir.join(LOGS_DIR).join(name);
        if let Err(e) = append(&path, text) {
            warn!(path = %path.display(), error = %e, "could not write incremental log");
        }
    }
}

/// Why files were added to the initial dirty set.
#[derive(Default)]
struct DirtyReasons {
    by_new_symbols: BTreeSet<String>,
    by_classpath: BTreeSet<String>,
    removed_outputs: Vec<String>,
}

fn prune_unknown_files(storage: &mut LookupStorage, all_files: &BTreeSet<String>) {
    let stale: BTreeSet<String> = storage
        .symbols()
        .filter_map(|symbol| storage.files_for(symbol))
        .flatten()
        .filter(|file| !all_files.contains(*file))
        .cloned()
        .collect();
    if !stale.is_empty() {
        debug!(files = stale.len(), "pruning lookups of unknown files");
        storage.remove_lookups_from(stale.iter().map(String::as_str));
    }
}

fn section<'a>(out: &mut String, title: &str, items: impl Iterator<Item = &'a str>) {
    out.push_str(title);
    out.push('\n');
    for item in items {
        out.push_str("  ");
        out.push_str(item);
        out.push('\n');
    }
}

fn append(path: &Path, text: &str) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}
