//! The processing-unit API.
//!
//! A [`ProcessingUnit`] is invoked once per round with a [`RoundEnv`], the
//! unit's view of the current cache generation. Units query symbols,
//! report diagnostics, emit generated files and return the symbols they
//! could not handle yet; those are handed back to them in the next round.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::debug;

use symproc_core::lookup::ScopeKind;
use symproc_core::raw::RawFile;
use symproc_core::visitor::{accept, VisitPolicy, Visitor};
use symproc_core::{NodeId, Session};

use crate::config::ProcessingConfig;
use crate::diagnostics::Diagnostics;

// ============================================================================
// ProcessingUnit
// ============================================================================

/// An analysis or generation pass driven round by round.
pub trait ProcessingUnit {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Process one round.
    ///
    /// `new_files` are the files added or changed since the previous round,
    /// `deferred` the symbols this unit returned last round, restored into
    /// the current generation. The returned symbols are deferred again.
    fn process(
        &mut self,
        env: &RoundEnv<'_>,
        new_files: &[NodeId],
        deferred: &[NodeId],
    ) -> Vec<NodeId>;

    /// Called instead of [`finish`](Self::finish) when the build failed.
    fn on_error(&mut self, _env: &RoundEnv<'_>) {}

    /// Called exactly once, after the final round.
    fn finish(&mut self, _env: &RoundEnv<'_>) {}
}

// ============================================================================
// Generated files
// ============================================================================

/// Inputs a generated file was derived from.
///
/// An aggregating output depends on every input, not just its sources: it
/// is regenerated whenever anything changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub aggregating: bool,
    /// File or declaration nodes the output was derived from.
    pub sources: Vec<NodeId>,
}

impl Dependencies {
    /// Output derived only from `sources`.
    pub fn isolating(sources: impl IntoIterator<Item = NodeId>) -> Self {
        Dependencies {
            aggregating: false,
            sources: sources.into_iter().collect(),
        }
    }

    /// Output that also depends on unknown inputs.
    pub fn aggregating(sources: impl IntoIterator<Item = NodeId>) -> Self {
        Dependencies {
            aggregating: true,
            sources: sources.into_iter().collect(),
        }
    }

    /// Output depending on all inputs.
    pub fn all_files() -> Self {
        Self::aggregating([])
    }
}

/// A file emitted by a unit.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    pub file: Rc<RawFile>,
    pub aggregating: bool,
    /// Paths of the source files the output was derived from.
    pub sources: BTreeSet<String>,
}

impl GeneratedFile {
    pub fn path(&self) -> &str {
        &self.file.path
    }
}

// ============================================================================
// RoundEnv
// ============================================================================

/// A unit's view of one round.
pub struct RoundEnv<'a> {
    round: u32,
    last_round: bool,
    session: &'a Session,
    config: &'a ProcessingConfig,
    diagnostics: &'a Diagnostics,
    all_files: Vec<NodeId>,
    new_files: Vec<NodeId>,
    /// Paths that already exist in the build: inputs and earlier outputs.
    taken_paths: &'a BTreeSet<String>,
    generated: RefCell<Vec<GeneratedFile>>,
}

impl<'a> RoundEnv<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        round: u32,
        last_round: bool,
        session: &'a Session,
        config: &'a ProcessingConfig,
        diagnostics: &'a Diagnostics,
        all_files: Vec<NodeId>,
        new_files: Vec<NodeId>,
        taken_paths: &'a BTreeSet<String>,
    ) -> Self {
        RoundEnv {
            round,
            last_round,
            session,
            config,
            diagnostics,
            all_files,
            new_files,
            taken_paths,
            generated: RefCell::new(Vec::new()),
        }
    }

    /// 1-based round number.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// True in the extra round run after processing converged with symbols
    /// still deferred. Units should report what they could not resolve.
    pub fn is_last_round(&self) -> bool {
        self.last_round
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn config(&self) -> &'a ProcessingConfig {
        self.config
    }

    pub fn diagnostics(&self) -> &'a Diagnostics {
        self.diagnostics
    }

    pub fn unit_options(&self) -> &'a BTreeMap<String, String> {
        &self.config.unit_options
    }

    /// Every input file of the current generation.
    pub fn all_files(&self) -> &[NodeId] {
        &self.all_files
    }

    /// Files new or changed in this round.
    pub fn new_files(&self) -> &[NodeId] {
        &self.new_files
    }

    // ------------------------------------------------------------------------
    // Symbol queries
    // ------------------------------------------------------------------------

    /// Classifier by qualified name.
    pub fn class_by_name(&self, fqn: &str) -> Option<NodeId> {
        self.session.class_by_name(fqn)
    }

    /// Like [`class_by_name`](Self::class_by_name), and records that the
    /// file containing `from` depends on `fqn`, found or not.
    pub fn class_by_name_from(&self, from: NodeId, fqn: &str) -> Option<NodeId> {
        if let Some(path) = self.source_path(from) {
            self.session.record_lookup(&path, fqn, ScopeKind::Package);
        }
        self.session.class_by_name(fqn)
    }

    /// Top-level declarations of a package.
    pub fn declarations_from_package(&self, package: &str) -> Vec<NodeId> {
        self.session.declarations_in(package)
    }

    /// Annotated symbols in the new files whose annotation is `name`.
    ///
    /// `name` matches an annotation by its resolved qualified name, or, if
    /// it has no dot, by the annotation's short name. With `in_depth`, the
    /// local declarations inside function bodies are searched too.
    pub fn symbols_with_annotation(&self, name: &str, in_depth: bool) -> Vec<NodeId> {
        let mut collector = AnnotatedCollector {
            in_depth,
            symbols: Vec::new(),
        };
        for &file in &self.new_files {
            accept(&mut collector, self.session, file, &());
        }
        collector
            .symbols
            .into_iter()
            .filter(|&node| {
                self.session
                    .annotations(node)
                    .into_iter()
                    .any(|annotation| annotation_matches(self.session, annotation, name))
            })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Register a generated file. It becomes an input of the next round.
    ///
    /// Returns `false`, and reports an error, if the path already exists in
    /// this build.
    pub fn emit_file(&self, file: Rc<RawFile>, dependencies: Dependencies) -> bool {
        let duplicate = self.taken_paths.contains(&file.path)
            || self.generated.borrow().iter().any(|g| g.file.path == file.path);
        if duplicate {
            self.diagnostics
                .error(format!("file already exists: {}", file.path), None);
            return false;
        }

        let sources: BTreeSet<String> = dependencies
            .sources
            .iter()
            .filter_map(|&node| self.source_path(node))
            .collect();
        debug!(
            path = %file.path,
            output_dir = ?self.config.output_dir_for(&file.path),
            aggregating = dependencies.aggregating,
            sources = sources.len(),
            "generated file"
        );
        self.generated.borrow_mut().push(GeneratedFile {
            file,
            aggregating: dependencies.aggregating,
            sources,
        });
        true
    }

    /// Files emitted so far in this round.
    pub fn generated(&self) -> Vec<GeneratedFile> {
        self.generated.borrow().clone()
    }

    pub(crate) fn into_generated(self) -> Vec<GeneratedFile> {
        self.generated.into_inner()
    }

    /// Path of the source file `node` is, or lives in.
    fn source_path(&self, node: NodeId) -> Option<String> {
        self.session.file_path(node).or_else(|| {
            self.session
                .containing_file(node)
                .and_then(|file| self.session.file_path(file))
        })
    }
}

fn annotation_matches(s: &Session, annotation: NodeId, name: &str) -> bool {
    let qualified = s
        .annotation_type(annotation)
        .and_then(|reference| s.type_info(s.resolve(reference)))
        .and_then(|ty| s.qualified_name(ty.declaration));
    if qualified.as_deref() == Some(name) {
        return true;
    }
    !name.contains('.') && s.short_name(annotation).as_deref() == Some(name)
}

/// Collects every node that carries annotations.
struct AnnotatedCollector {
    in_depth: bool,
    symbols: Vec<NodeId>,
}

impl AnnotatedCollector {
    fn collect(&mut self, s: &Session, node: NodeId) {
        if !s.annotations(node).is_empty() {
            self.symbols.push(node);
        }
    }

    fn visit_all(&mut self, s: &Session, nodes: Vec<NodeId>) {
        for node in nodes {
            accept(self, s, node, &());
        }
    }
}

impl Visitor<(), ()> for AnnotatedCollector {
    const POLICY: VisitPolicy = VisitPolicy::Empty;

    fn default_handler(&mut self, _: &Session, _: NodeId, _: &()) {}

    fn visit_file(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
        self.visit_all(s, s.declarations(node));
    }

    fn visit_class(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
        self.visit_all(s, s.type_parameters(node));
        self.visit_all(s, s.declarations(node));
    }

    fn visit_function(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
        self.visit_all(s, s.type_parameters(node));
        self.visit_all(s, s.parameters(node));
        if self.in_depth {
            self.visit_all(s, s.declarations(node));
        }
    }

    fn visit_property(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
        self.visit_all(s, s.type_parameters(node));
    }

    fn visit_type_alias(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
        self.visit_all(s, s.type_parameters(node));
    }

    fn visit_type_parameter(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
    }

    fn visit_value_parameter(&mut self, s: &Session, node: NodeId, _: &()) {
        self.collect(s, node);
    }
}
