//! Core infrastructure for symproc.
//!
//! This crate provides the backend-independent symbol engine:
//! - Raw facts: the immutable backend boundary
//! - Identity keys and session-scoped object caches with bulk clear
//! - Replay-safe memoized sequences
//! - The symbol node arena, materialization and type resolution
//! - The symbol index and classifier name resolution
//! - Visitors: empty, default, top-down and validating traversal
//! - Lookup tracking and the durable lookup store
//! - Error types and persistence helpers

pub mod cache;
pub mod error;
pub mod identity;
pub mod index;
pub mod lookup;
pub mod node;
pub mod persist;
pub mod raw;
pub mod sequence;
pub mod session;
pub mod types;
pub mod visitor;

pub use error::{LookupError, LookupResult, StorageError, StorageResult};
pub use node::{NodeId, NodeKind};
pub use session::Session;
pub use types::{Nullability, Type, TypeId};
