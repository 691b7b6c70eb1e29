//! Error types for the symbol core.
//!
//! Resolution failures are not errors here: an unresolvable reference
//! becomes the error type and an owner that cannot be found becomes a
//! `None` parent. The types below cover the failures that must reach the
//! build:
//!
//! - [`StorageError`]: the durable lookup store could not be read or written
//! - [`LookupError`]: a lookup tracker could not accept a record

use std::io;
use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Storage Errors
// ============================================================================

/// Errors from persisted incremental state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error while reading or writing a store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data is unreadable or inconsistent.
    #[error("storage is corrupt at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Stored data was written by an incompatible schema.
    #[error("unsupported storage schema {found} at {path} (expected {expected})")]
    UnsupportedSchema {
        path: PathBuf,
        found: String,
        expected: String,
    },

    /// Another writer changed the store between open and flush.
    ///
    /// Concurrent builds must use distinct storage directories.
    #[error("storage was modified concurrently (expected {expected}, found {actual})")]
    ConcurrentModification { expected: String, actual: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// Lookup Errors
// ============================================================================

/// Errors from lookup trackers.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The tracker's backing store failed.
    #[error("lookup storage failure: {0}")]
    Storage(#[from] StorageError),

    /// The tracker no longer accepts records (its contents were merged).
    #[error("lookup tracker is sealed; record for {file} ({scope}.{name}) rejected")]
    Sealed {
        file: String,
        scope: String,
        name: String,
    },
}

/// Result type for lookup tracking.
pub type LookupResult<T> = Result<T, LookupError>;
