//! Error types and exit codes for symproc builds.
//!
//! Resolution failures never surface here; they become the error type or a
//! missing parent inside the session. A processing unit that reports a
//! fatal diagnostic does not produce an error value either: the build still
//! returns a [`BuildOutcome`](crate::driver::BuildOutcome), with
//! [`ExitCode::ProcessingError`].
//!
//! ## Design
//!
//! - **Unified type**: [`DriverError`] is the single error returned by a build
//! - **Bridging**: lower-level errors convert with `From`, so `?` works
//!   across layers
//! - **Exit codes**: [`ExitCode`] provides stable integer codes for hosts

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use symproc_core::{LookupError, StorageError};

// ============================================================================
// Exit Codes
// ============================================================================

/// Result of a build as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    /// Every round completed without error diagnostics.
    Ok = 0,
    /// A processing unit reported an error.
    ProcessingError = 1,
}

impl ExitCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_ok(&self) -> bool {
        *self == ExitCode::Ok
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Invalid build configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has a value the driver cannot work with.
    #[error("invalid configuration field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// An environment override could not be parsed.
    #[error("invalid value '{value}' for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },

    /// A path that must be a directory is something else.
    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Driver Errors
// ============================================================================

/// Unified error for a build.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The configuration was rejected before the first round.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted incremental state could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A lookup tracker rejected a record.
    #[error("lookup tracking error: {0}")]
    Lookup(#[from] LookupError),

    /// IO error outside the lookup store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error outside the lookup store.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rounds kept making progress past the configured bound.
    #[error("processing did not converge within {max_rounds} rounds")]
    RoundLimit { max_rounds: u32 },
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Storage failures, whether raised directly or through a tracker.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            DriverError::Storage(_) | DriverError::Lookup(LookupError::Storage(_))
        )
    }
}
