//! Transitive invalidation.
//!
//! Starting from the initially dirty files, dirtiness spreads along three
//! kinds of edges until a fixpoint:
//!
//! - file -> symbols it defines (from the symbols map)
//! - symbol -> files that looked it up (from the lookup store)
//! - source <-> output, both ways: a dirty source makes its outputs dirty,
//!   and regenerating an output needs every source it came from

use std::collections::{BTreeMap, BTreeSet};

use symproc_core::lookup::{LookupStorage, LookupSymbol};

use super::maps::{FileToFilesMap, FileToSymbolsMap};

enum Item {
    File(String),
    Symbol(LookupSymbol),
}

/// Worklist propagation over the persisted dependency graph.
pub struct DirtinessPropagator<'a> {
    lookups: &'a LookupStorage,
    symbols: &'a FileToSymbolsMap,
    source_to_outputs: &'a FileToFilesMap,
    output_to_sources: BTreeMap<&'a str, BTreeSet<&'a str>>,
    visited_files: BTreeSet<String>,
    visited_symbols: BTreeSet<LookupSymbol>,
}

impl<'a> DirtinessPropagator<'a> {
    /// `virtual_keys` are source-to-output keys that are not real sources;
    /// they never become dirty through their outputs.
    pub fn new(
        lookups: &'a LookupStorage,
        symbols: &'a FileToSymbolsMap,
        source_to_outputs: &'a FileToFilesMap,
        virtual_keys: &[&str],
    ) -> Self {
        let mut output_to_sources: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for (source, outputs) in source_to_outputs.iter() {
            if virtual_keys.contains(&source) {
                continue;
            }
            for output in outputs {
                output_to_sources.entry(output).or_default().insert(source);
            }
        }
        DirtinessPropagator {
            lookups,
            symbols,
            source_to_outputs,
            output_to_sources,
            visited_files: BTreeSet::new(),
            visited_symbols: BTreeSet::new(),
        }
    }

    /// Every file reachable from `initial`, including `initial` itself.
    pub fn propagate(mut self, initial: impl IntoIterator<Item = String>) -> BTreeSet<String> {
        let mut work: Vec<Item> = initial.into_iter().map(Item::File).collect();
        while let Some(item) = work.pop() {
            match item {
                Item::Symbol(symbol) => {
                    if !self.visited_symbols.insert(symbol.clone()) {
                        continue;
                    }
                    for file in self.lookups.get(&symbol.name, &symbol.scope) {
                        work.push(Item::File(file));
                    }
                }
                Item::File(file) => {
                    if self.visited_files.contains(&file) {
                        continue;
                    }
                    if let Some(defined) = self.symbols.get(&file) {
                        work.extend(defined.iter().cloned().map(Item::Symbol));
                    }
                    if let Some(outputs) = self.source_to_outputs.get(&file) {
                        work.extend(outputs.iter().cloned().map(Item::File));
                    }
                    if let Some(sources) = self.output_to_sources.get(file.as_str()) {
                        work.extend(sources.iter().map(|s| Item::File(s.to_string())));
                    }
                    self.visited_files.insert(file);
                }
            }
        }
        self.visited_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symproc_core::lookup::{LookupBuffer, LookupTracker, ScopeKind};
    use tempfile::TempDir;

    struct Graph {
        _dir: TempDir,
        lookups: LookupStorage,
        symbols: FileToSymbolsMap,
        outputs: FileToFilesMap,
    }

    fn graph() -> Graph {
        let dir = TempDir::new().unwrap();
        let mut lookups = LookupStorage::open(dir.path().join("lookups")).unwrap();
        let mut buffer = LookupBuffer::new();
        // B.kt uses p.A; C.kt uses p.B.
        buffer.record("src/B.kt", "p", ScopeKind::Package, "A").unwrap();
        buffer.record("src/C.kt", "p", ScopeKind::Package, "B").unwrap();
        lookups.update(&buffer, ["src/B.kt", "src/C.kt"], Vec::<&str>::new());

        let mut symbols = FileToSymbolsMap::open(dir.path().join("symbols.json")).unwrap();
        symbols.put("src/A.kt", vec![LookupSymbol::new("A", "p")]);
        symbols.put("src/B.kt", vec![LookupSymbol::new("B", "p")]);
        symbols.put("src/C.kt", vec![LookupSymbol::new("C", "p")]);

        let mut outputs = FileToFilesMap::open(dir.path().join("outputs.json")).unwrap();
        outputs.put("src/D.kt", vec!["gen/Agg.kt".to_string()]);
        outputs.put("src/E.kt", vec!["gen/Agg.kt".to_string()]);
        outputs.put("<any-changes>", vec!["gen/All.kt".to_string()]);

        Graph {
            _dir: dir,
            lookups,
            symbols,
            outputs,
        }
    }

    fn run(g: &Graph, initial: &[&str]) -> Vec<String> {
        DirtinessPropagator::new(&g.lookups, &g.symbols, &g.outputs, &["<any-changes>"])
            .propagate(initial.iter().map(|s| s.to_string()))
            .into_iter()
            .collect()
    }

    #[test]
    fn follows_lookup_chain() {
        let g = graph();
        assert_eq!(run(&g, &["src/A.kt"]), vec!["src/A.kt", "src/B.kt", "src/C.kt"]);
        assert_eq!(run(&g, &["src/C.kt"]), vec!["src/C.kt"]);
    }

    #[test]
    fn outputs_pull_in_all_their_sources() {
        let g = graph();
        assert_eq!(run(&g, &["src/D.kt"]), vec!["gen/Agg.kt", "src/D.kt", "src/E.kt"]);
    }

    #[test]
    fn virtual_key_only_propagates_forward() {
        let g = graph();
        assert_eq!(run(&g, &["<any-changes>"]), vec!["<any-changes>", "gen/All.kt"]);
        assert_eq!(run(&g, &["gen/All.kt"]), vec!["gen/All.kt"]);
    }
}
