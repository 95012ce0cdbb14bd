//! Error taxonomy for the activation engine.
//!
//! Nothing below the dispatch boundary escapes to the trigger-processing
//! caller: predicate, init, and cleanup failures are caught where they
//! occur, wrapped in the matching type here, and reported through tracing.
//! Only registration errors are surfaced to the caller, since a bad static
//! registration set is a startup programming error rather than a runtime
//! condition.

use thiserror::Error;

/// Boxed error produced by user-supplied callables.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while populating the feature registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("feature `{0}` is already registered")]
    DuplicateFeature(String),

    #[error("registry is frozen; features must be registered before triggers start")]
    RegistryFrozen,
}

/// A predicate threw or rejected. Fail-closed: the variant is treated as
/// not matching, never as matching.
#[derive(Debug, Error)]
#[error("predicate `{name}` failed: {source}")]
pub struct PredicateError {
    pub name: String,
    #[source]
    pub source: DynError,
}

/// A variant's init body threw or rejected. The variant is treated as not
/// activated (its claim is released) and retried on the next eligible
/// trigger.
#[derive(Debug, Error)]
#[error("init for `{variant}` failed: {source}")]
pub struct InitError {
    pub variant: String,
    #[source]
    pub source: DynError,
}

/// A cleanup callable failed during retirement. Isolated per callable; the
/// remaining cleanups for the same variant still run.
#[derive(Debug, Error)]
#[error("cleanup for `{variant}` failed: {source}")]
pub struct CleanupError {
    pub variant: String,
    #[source]
    pub source: DynError,
}
