//! Incremental lookup tracking.
//!
//! While analyzing a file, every name lookup (a simple name searched for in
//! a scope) is recorded. If the set of symbols defined in that scope later
//! changes, every file that looked there has to be analyzed again.
//!
//! - [`LookupTracker`]: the recording interface, always at (scope, name)
//!   granularity
//! - [`LookupBuffer`]: in-memory, union-merged records for one build
//! - [`SharedTracker`]: shared handle to a buffer, for installing into a
//!   session while keeping access to the records
//! - [`DualLookupTracker`]: feeds two consumers from one analysis pass
//! - [`ClassLookupTracker`]: coarsens member lookups to class granularity
//! - [`storage::LookupStorage`]: the durable index

pub mod storage;

use serde::{Deserialize, Serialize};
use std::cell::{Ref, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::error::{LookupError, LookupResult};

pub use storage::LookupStorage;

/// Scope used for names without a qualifier.
pub const ANONYMOUS_SCOPE: &str = "<anonymous>";

// ============================================================================
// LookupSymbol
// ============================================================================

/// A looked-up name within a scope.
///
/// Ordering is by scope first, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LookupSymbol {
    pub scope: String,
    pub name: String,
}

impl LookupSymbol {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        LookupSymbol {
            scope: scope.into(),
            name: name.into(),
        }
    }

    /// Split a qualified name at its last dot.
    pub fn from_fqn(fqn: &str) -> Self {
        match fqn.rsplit_once('.') {
            Some((scope, name)) => LookupSymbol::new(name, scope),
            None => LookupSymbol::new(fqn, ANONYMOUS_SCOPE),
        }
    }
}

impl fmt::Display for LookupSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.scope, self.name)
        }
    }
}

/// What kind of scope a lookup searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Package,
    Classifier,
}

// ============================================================================
// LookupTracker
// ============================================================================

/// Receives lookup records during analysis.
pub trait LookupTracker {
    /// Record that `name` was looked up in `scope` while analyzing `file`.
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()>;
}

impl<T: LookupTracker + ?Sized> LookupTracker for Box<T> {
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()> {
        (**self).record(file, scope, kind, name)
    }
}

/// Record a lookup of a qualified name, split at the last dot.
pub fn record_fqn_lookup(
    tracker: &mut dyn LookupTracker,
    file: &str,
    fqn: &str,
    kind: ScopeKind,
) -> LookupResult<()> {
    let symbol = LookupSymbol::from_fqn(fqn);
    tracker.record(file, &symbol.scope, kind, &symbol.name)
}

/// Tracker that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracker;

impl LookupTracker for NoopTracker {
    fn record(&mut self, _: &str, _: &str, _: ScopeKind, _: &str) -> LookupResult<()> {
        Ok(())
    }
}

// ============================================================================
// LookupBuffer
// ============================================================================

/// In-memory lookup records.
///
/// Records are unioned: recording the same (symbol, file) twice is a no-op.
/// Once sealed, further records are rejected instead of being dropped.
#[derive(Debug, Clone, Default)]
pub struct LookupBuffer {
    records: BTreeMap<LookupSymbol, BTreeSet<String>>,
    sealed: bool,
}

impl LookupBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files that looked up `name` in `scope`.
    pub fn files_for(&self, name: &str, scope: &str) -> Option<&BTreeSet<String>> {
        self.records.get(&LookupSymbol::new(name, scope))
    }

    /// All records in (scope, name) order.
    pub fn iter(&self) -> impl Iterator<Item = (&LookupSymbol, &BTreeSet<String>)> {
        self.records.iter()
    }

    /// Files mentioned by any record.
    pub fn files(&self) -> BTreeSet<&str> {
        self.records
            .values()
            .flat_map(|files| files.iter().map(String::as_str))
            .collect()
    }

    /// Union another buffer into this one.
    pub fn merge(&mut self, other: &LookupBuffer) {
        for (symbol, files) in &other.records {
            self.records
                .entry(symbol.clone())
                .or_default()
                .extend(files.iter().cloned());
        }
    }

    /// Number of distinct symbols.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Refuse further records.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Dump as `scope.name -> files`, sorted.
    pub fn dump(&self) -> BTreeMap<String, Vec<String>> {
        self.records
            .iter()
            .map(|(symbol, files)| (symbol.to_string(), files.iter().cloned().collect()))
            .collect()
    }
}

impl LookupTracker for LookupBuffer {
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        _kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()> {
        if self.sealed {
            return Err(LookupError::Sealed {
                file: file.to_string(),
                scope: scope.to_string(),
                name: name.to_string(),
            });
        }
        self.records
            .entry(LookupSymbol::new(name, scope))
            .or_default()
            .insert(file.to_string());
        Ok(())
    }
}

// ============================================================================
// SharedTracker
// ============================================================================

/// Shared handle to a [`LookupBuffer`].
#[derive(Debug, Clone, Default)]
pub struct SharedTracker(Rc<RefCell<LookupBuffer>>);

impl SharedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the records.
    pub fn buffer(&self) -> Ref<'_, LookupBuffer> {
        self.0.borrow()
    }

    /// Seal the underlying buffer.
    pub fn seal(&self) {
        self.0.borrow_mut().seal();
    }
}

impl LookupTracker for SharedTracker {
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()> {
        self.0.borrow_mut().record(file, scope, kind, name)
    }
}

// ============================================================================
// DualLookupTracker
// ============================================================================

/// Forwards every record to two trackers.
///
/// Both delegates always see the record; if either fails, the first failure
/// is returned after both have run.
#[derive(Debug, Clone, Default)]
pub struct DualLookupTracker<A, B> {
    first: A,
    second: B,
}

impl<A, B> DualLookupTracker<A, B> {
    pub fn new(first: A, second: B) -> Self {
        DualLookupTracker { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A: LookupTracker, B: LookupTracker> LookupTracker for DualLookupTracker<A, B> {
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()> {
        let first = self.first.record(file, scope, kind, name);
        let second = self.second.record(file, scope, kind, name);
        first.and(second)
    }
}

// ============================================================================
// ClassLookupTracker
// ============================================================================

/// Class-granularity consumer.
///
/// A lookup of a member inside a classifier scope is recorded as a lookup of
/// the classifier itself; package-level lookups pass through.
#[derive(Debug, Clone, Default)]
pub struct ClassLookupTracker<T> {
    inner: T,
}

impl<T> ClassLookupTracker<T> {
    pub fn new(inner: T) -> Self {
        ClassLookupTracker { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: LookupTracker> LookupTracker for ClassLookupTracker<T> {
    fn record(
        &mut self,
        file: &str,
        scope: &str,
        kind: ScopeKind,
        name: &str,
    ) -> LookupResult<()> {
        match kind {
            ScopeKind::Package => self.inner.record(file, scope, kind, name),
            ScopeKind::Classifier => {
                let class = LookupSymbol::from_fqn(scope);
                self.inner
                    .record(file, &class.scope, ScopeKind::Package, &class.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tracker that always fails, counting calls.
    struct Failing {
        calls: usize,
    }

    impl LookupTracker for Failing {
        fn record(
            &mut self,
            file: &str,
            scope: &str,
            _: ScopeKind,
            name: &str,
        ) -> LookupResult<()> {
            self.calls += 1;
            Err(LookupError::Sealed {
                file: file.to_string(),
                scope: scope.to_string(),
                name: name.to_string(),
            })
        }
    }

    mod symbol_tests {
        use super::*;

        #[test]
        fn orders_by_scope_then_name() {
            let mut symbols = vec![
                LookupSymbol::new("A", "z.pkg"),
                LookupSymbol::new("Z", "a.pkg"),
                LookupSymbol::new("B", "a.pkg"),
            ];
            symbols.sort();
            let rendered: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
            assert_eq!(rendered, vec!["a.pkg.B", "a.pkg.Z", "z.pkg.A"]);
        }

        #[test]
        fn fqn_split() {
            assert_eq!(
                LookupSymbol::from_fqn("com.example.Foo"),
                LookupSymbol::new("Foo", "com.example")
            );
            assert_eq!(
                LookupSymbol::from_fqn("Foo"),
                LookupSymbol::new("Foo", ANONYMOUS_SCOPE)
            );
        }
    }

    mod buffer_tests {
        use super::*;

        #[test]
        fn records_union() {
            let mut buffer = LookupBuffer::new();
            buffer.record("a.kt", "pkg", ScopeKind::Package, "Foo").unwrap();
            buffer.record("a.kt", "pkg", ScopeKind::Package, "Foo").unwrap();
            buffer.record("b.kt", "pkg", ScopeKind::Package, "Foo").unwrap();
            let files = buffer.files_for("Foo", "pkg").unwrap();
            assert_eq!(files.len(), 2);
            assert_eq!(buffer.len(), 1);
        }

        #[test]
        fn merge_unions_files() {
            let mut a = LookupBuffer::new();
            let mut b = LookupBuffer::new();
            a.record("a.kt", "pkg", ScopeKind::Package, "X").unwrap();
            b.record("b.kt", "pkg", ScopeKind::Package, "X").unwrap();
            b.record("b.kt", "pkg", ScopeKind::Package, "Y").unwrap();
            a.merge(&b);
            assert_eq!(a.files_for("X", "pkg").unwrap().len(), 2);
            assert!(a.files_for("Y", "pkg").is_some());
            assert_eq!(a.files().len(), 2);
        }

        #[test]
        fn sealed_buffer_rejects_records() {
            let mut buffer = LookupBuffer::new();
            buffer.seal();
            let err = buffer
                .record("a.kt", "pkg", ScopeKind::Package, "Foo")
                .unwrap_err();
            assert!(matches!(err, LookupError::Sealed { .. }));
            assert!(buffer.is_empty());
        }

        #[test]
        fn dump_uses_dotted_keys() {
            let mut buffer = LookupBuffer::new();
            buffer.record("a.kt", "pkg.Outer", ScopeKind::Classifier, "inner").unwrap();
            let dump = buffer.dump();
            assert_eq!(dump["pkg.Outer.inner"], vec!["a.kt".to_string()]);
        }

        #[test]
        fn fqn_helper_records_split_name() {
            let mut buffer = LookupBuffer::new();
            record_fqn_lookup(&mut buffer, "a.kt", "lib.Base", ScopeKind::Package).unwrap();
            assert!(buffer.files_for("Base", "lib").is_some());
        }
    }

    mod dual_tests {
        use super::*;

        #[test]
        fn both_delegates_receive_every_record() {
            let symbols = SharedTracker::new();
            let classes = SharedTracker::new();
            let mut dual = DualLookupTracker::new(symbols.clone(), classes.clone());
            dual.record("a.kt", "pkg", ScopeKind::Package, "Foo").unwrap();
            assert!(symbols.buffer().files_for("Foo", "pkg").is_some());
            assert!(classes.buffer().files_for("Foo", "pkg").is_some());
        }

        #[test]
        fn failure_does_not_suppress_the_other_delegate() {
            let healthy = SharedTracker::new();
            let mut dual = DualLookupTracker::new(Failing { calls: 0 }, healthy.clone());
            let result = dual.record("a.kt", "pkg", ScopeKind::Package, "Foo");
            assert!(result.is_err());
            assert!(healthy.buffer().files_for("Foo", "pkg").is_some());

            let healthy_first = SharedTracker::new();
            let mut dual = DualLookupTracker::new(healthy_first.clone(), Failing { calls: 0 });
            assert!(dual.record("a.kt", "pkg", ScopeKind::Package, "Bar").is_err());
            assert_eq!(dual.second().calls, 1);
            assert!(healthy_first.buffer().files_for("Bar", "pkg").is_some());
        }
    }

    mod class_tracker_tests {
        use super::*;

        #[test]
        fn member_lookup_coarsens_to_class() {
            let classes = SharedTracker::new();
            let mut tracker = ClassLookupTracker::new(classes.clone());
            tracker
                .record("a.kt", "pkg.Outer", ScopeKind::Classifier, "member")
                .unwrap();
            tracker.record("a.kt", "pkg", ScopeKind::Package, "Top").unwrap();

            let buffer = classes.buffer();
            assert!(buffer.files_for("Outer", "pkg").is_some());
            assert!(buffer.files_for("member", "pkg.Outer").is_none());
            assert!(buffer.files_for("Top", "pkg").is_some());
        }
    }
}
