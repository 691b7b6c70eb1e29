//! symproc: incremental symbol processing.
//!
//! Processing units (annotation processors, generators, checkers) are run in
//! rounds over cached symbol views of a module's sources. Files a unit
//! generates become inputs of the next round, and symbols it cannot handle
//! yet are carried over. Lookups made during analysis are recorded so later
//! builds only reprocess the files a change can affect.
//!
//! The symbol engine itself lives in `symproc-core` and is re-exported here.

// Symbol engine - re-exported from symproc-core
pub use symproc_core::cache;
pub use symproc_core::identity;
pub use symproc_core::index;
pub use symproc_core::lookup;
pub use symproc_core::node;
pub use symproc_core::persist;
pub use symproc_core::raw;
pub use symproc_core::sequence;
pub use symproc_core::session;
pub use symproc_core::types;
pub use symproc_core::visitor;
pub use symproc_core::{LookupError, NodeId, NodeKind, Session, StorageError, Type, TypeId};

// Build configuration and reporting
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;

// Rounds
pub mod deferred;
pub mod driver;
pub mod inputs;
pub mod processing;

// Incremental state across builds
pub mod incremental;

pub use config::ProcessingConfig;
pub use driver::{BuildOutcome, RoundDriver};
pub use error::{DriverError, DriverResult, ExitCode};
pub use processing::{Dependencies, ProcessingUnit, RoundEnv};
