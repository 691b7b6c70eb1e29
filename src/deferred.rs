//! Deferred symbols carried between rounds.
//!
//! A node id is only valid in the generation that produced it, so symbols
//! a unit defers are captured as [`Restorable`] handles on the raw facts
//! behind them and materialized again after the caches were cleared.

use std::collections::BTreeSet;
use std::mem;
use std::rc::Rc;

use tracing::warn;

use symproc_core::raw::{RawDecl, RawFact, RawFile};
use symproc_core::{NodeId, Session};

/// Generation-independent handle to a deferred file or declaration.
#[derive(Debug, Clone)]
pub enum Restorable {
    File(Rc<RawFile>),
    Declaration {
        decl: Rc<RawDecl>,
        /// Fallback key when the declaration's file was replaced.
        qualified_name: Option<String>,
    },
}

impl Restorable {
    /// Handle for `node`.
    ///
    /// Only source files and source declarations can be deferred; `None`
    /// for anything else.
    pub fn capture(s: &Session, node: NodeId) -> Option<Restorable> {
        if !s.origin(node).is_source() {
            return None;
        }
        match s.raw_fact(node)? {
            RawFact::File(file) => Some(Restorable::File(file)),
            RawFact::Declaration(decl) => Some(Restorable::Declaration {
                decl,
                qualified_name: s.qualified_name(node),
            }),
        }
    }

    /// Node for this handle in the session's current generation.
    ///
    /// The same raw fact is preferred; if it left the inputs (its file was
    /// regenerated or replaced) the file path or qualified name is used.
    pub fn restore(&self, s: &Session) -> Option<NodeId> {
        let index = s.index();
        match self {
            Restorable::File(file) => {
                let current = index.file(&file.path)?;
                Some(s.materialize(Rc::clone(current)))
            }
            Restorable::Declaration {
                decl,
                qualified_name,
            } => {
                if index.contains(decl) {
                    return Some(s.materialize(Rc::clone(decl)));
                }
                let candidate = index
                    .declarations_named(qualified_name.as_deref()?)
                    .iter()
                    .find(|d| mem::discriminant(&d.kind) == mem::discriminant(&decl.kind))?;
                Some(s.materialize(Rc::clone(candidate)))
            }
        }
    }

    /// Stable description used to tell whether the deferred set changed.
    pub fn key(&self) -> String {
        match self {
            Restorable::File(file) => format!("file:{}", file.path),
            Restorable::Declaration {
                qualified_name: Some(name),
                ..
            } => format!("decl:{name}"),
            Restorable::Declaration { decl, .. } => {
                format!("local:{}@{:p}", decl.name, Rc::as_ptr(decl))
            }
        }
    }
}

/// Capture `nodes` returned by `unit`, dropping what cannot be carried.
pub(crate) fn capture_all(s: &Session, unit: &str, nodes: &[NodeId]) -> Vec<Restorable> {
    nodes
        .iter()
        .filter_map(|&node| {
            let captured = Restorable::capture(s, node);
            if captured.is_none() {
                warn!(
                    unit,
                    node = %node,
                    kind = %s.kind(node),
                    origin = %s.origin(node),
                    "dropping deferred symbol that cannot be restored"
                );
            }
            captured
        })
        .collect()
}

/// Restore `deferred` for `unit` into the current generation.
pub(crate) fn restore_all(s: &Session, unit: &str, deferred: &[Restorable]) -> Vec<NodeId> {
    deferred
        .iter()
        .filter_map(|handle| {
            let restored = handle.restore(s);
            if restored.is_none() {
                warn!(unit, symbol = %handle.key(), "deferred symbol no longer exists");
            }
            restored
        })
        .collect()
}

/// Composition of a unit's deferred set.
pub(crate) fn keys(deferred: &[Restorable]) -> BTreeSet<String> {
    deferred.iter().map(Restorable::key).collect()
}
