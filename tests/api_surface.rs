//! Compile-only test to verify public API surface.
//!
//! This file serves as a compile-time contract for the public API.
//! If this file fails to compile, the public API has regressed.
//!
//! Run with: cargo test -- api_surface

// Allow unused imports - this test is about compile-time verification, not runtime usage
#![allow(unused_imports)]

// ============================================================================
// Symbol Engine (re-exported from symproc-core)
// ============================================================================

// raw module - immutable facts supplied by a backend
use symproc::raw::{
    ClassKind, ClasspathEntry, ConstValue, Location, Modifier, Origin, RawAnnotation, RawDecl,
    RawDeclKind, RawElement, RawFact, RawFile, RawParam, RawTypeArg, RawTypeParam, RawTypeRef,
    RawValueArg, Span, Variance,
};

// identity and cache modules - session-scoped object caches
use symproc::cache::{CacheRegistry, Clearable, ObjectCache};
use symproc::identity::{ContextKey, IdKey};

// sequence module - replay-safe lazy sequences
use symproc::sequence::{MemoizedIter, MemoizedSequence};

// node, session and types modules - materialized symbols
use symproc::node::{Annotated, DeclarationContainer, ModifierListOwner};
use symproc::session::DeclarationWalk;
use symproc::types::Nullability;
use symproc::{NodeId, NodeKind, Session, Type, TypeId};

// index module - name resolution
use symproc::index::{Owner, ResolutionSite, SymbolIndex, TypeResolver};

// visitor module - traversal and validation
use symproc::visitor::{accept, validate, validate_with, VisitPolicy, Visitor};

// lookup module - lookup tracking and the durable store
use symproc::lookup::{
    ClassLookupTracker, DualLookupTracker, LookupBuffer, LookupStorage, LookupSymbol,
    LookupTracker, NoopTracker, ScopeKind, SharedTracker, ANONYMOUS_SCOPE,
};

// persist module and errors
use symproc::persist::{atomic_write, content_token, format_timestamp, hash_bytes};
use symproc::{LookupError, StorageError};

// ============================================================================
// Processing
// ============================================================================

use symproc::config::{ConfigSource, ConfigValue, ResolvedFlags, DEFAULT_MAX_ROUNDS};
use symproc::deferred::Restorable;
use symproc::diagnostics::{Diagnostic, Diagnostics, Severity};
use symproc::error::{ConfigError, ConfigResult};
use symproc::inputs::InputSet;
use symproc::logging::{init_tracing, LogFormat, LogLevel};
use symproc::processing::GeneratedFile;
use symproc::{
    BuildOutcome, Dependencies, DriverError, DriverResult, ExitCode, ProcessingConfig,
    ProcessingUnit, RoundDriver, RoundEnv,
};

// ============================================================================
// Incremental Builds
// ============================================================================

use symproc::incremental::maps::{FileToFilesMap, FileToSymbolsMap, MAP_SCHEMA_VERSION};
use symproc::incremental::propagate::DirtinessPropagator;
use symproc::incremental::{IncrementalContext, ANY_CHANGES_KEY, REMOVED_OUTPUTS_KEY};

// ============================================================================
// Test
// ============================================================================

#[test]
fn api_surface_compiles() {
    // The imports above form the public API contract.
    // Any change that breaks these imports is a breaking change.
    let _ = std::any::type_name::<RawFile>();
    let _ = std::any::type_name::<Session>();
    let _ = std::any::type_name::<SymbolIndex>();
    let _ = std::any::type_name::<LookupStorage>();
    let _ = std::any::type_name::<RoundDriver>();
    let _ = std::any::type_name::<IncrementalContext>();
    let _ = std::any::type_name::<FileToFilesMap>();
}

#[test]
fn schema_versions_are_stable() {
    // Persisted cache documents are part of the public contract
    assert_eq!(symproc::lookup::storage::LOOKUP_SCHEMA_VERSION, "1");
    assert_eq!(MAP_SCHEMA_VERSION, "1");
}
