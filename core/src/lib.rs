pub mod dedup;
pub mod document;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod predicate;
pub mod registry;

// Re-exports for convenience
pub use dedup::{ActivationRecord, ClaimTracker};
pub use document::{DocumentSurface, MemoryDocument};
pub use engine::{
    ActivationResult, Engine, EngineOptions, InvocationOutcome, OutcomeState, SkipReason, Trigger,
    TriggerReport, VariantOutcome,
};
pub use error::{CleanupError, DynError, InitError, PredicateError, RegistryError};
pub use lifecycle::LifecycleManager;
pub use predicate::{EvalContext, Mode, Predicate, evaluate};
pub use registry::{
    Activation, Cleanup, DedupStrategy, FeatureDefinition, FeatureRegistry, FeatureSet, VariantId,
    VariantSpec,
};
