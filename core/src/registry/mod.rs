//! Feature registry.
//!
//! This module provides:
//! - **VariantSpec**: one independently-evaluated activation rule plus its
//!   logic (predicates, dedup strategy, init/deinit callables)
//! - **FeatureDefinition**: a named unit of optional behavior owning an
//!   ordered sequence of variants
//! - **FeatureRegistry**: the append-only startup collection with an
//!   explicit freeze boundary producing the immutable `FeatureSet` the
//!   scheduler walks
//!
//! Registration happens once at process startup. Registering the same id
//! twice, or registering after the freeze boundary, is a programming error
//! in the static registration set and fails loudly.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hashbrown::HashSet;
use tracing::debug;

use lamina_types::ClaimScope;

use crate::error::{DynError, RegistryError};
use crate::predicate::{EvalContext, Predicate};

/// What an init body reports on normal completion.
///
/// Declination is a tagged result, not an error: the variant ran, looked at
/// the document, and chose not to apply itself. No activation record is
/// written, so the variant stays eligible for future triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated,
    Declined,
}

/// Boxed future an init body resolves to.
pub type InitFuture = Pin<Box<dyn Future<Output = Result<Activation, DynError>> + Send>>;

pub(crate) type InitFn = Arc<dyn Fn(EvalContext) -> InitFuture + Send + Sync>;

/// A cleanup callable registered for later invocation by the lifecycle
/// manager.
#[derive(Clone)]
pub struct Cleanup {
    run: Arc<dyn Fn() -> Result<(), DynError> + Send + Sync>,
}

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<(), DynError> + Send + Sync + 'static,
    {
        Self { run: Arc::new(f) }
    }

    /// Cleanup from a closure that cannot fail.
    pub fn infallible<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            run: Arc::new(move || {
                f();
                Ok(())
            }),
        }
    }

    pub(crate) fn invoke(&self) -> Result<(), DynError> {
        (self.run)()
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup").finish_non_exhaustive()
    }
}

/// Dedup-key strategy for a variant: which claim key it writes and how long
/// the claim survives. The key defaults to the owning feature's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupStrategy {
    key: Option<String>,
    scope: ClaimScope,
}

impl DedupStrategy {
    /// Claim persists until explicit release or engine teardown.
    pub fn process() -> Self {
        Self {
            key: None,
            scope: ClaimScope::Process,
        }
    }

    /// Claim clears when the next navigation trigger starts.
    pub fn epoch() -> Self {
        Self {
            key: None,
            scope: ClaimScope::Epoch,
        }
    }

    /// Override the claim key (default: the feature id).
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn scope(&self) -> ClaimScope {
        self.scope
    }

    pub fn effective_key(&self, feature_id: &str) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => feature_id.to_string(),
        }
    }
}

/// One independently-evaluated activation rule plus its logic.
pub struct VariantSpec {
    pub(crate) include: Vec<Predicate>,
    pub(crate) exclude: Vec<Predicate>,
    pub(crate) as_long_as: Option<Vec<Predicate>>,
    pub(crate) deduplicate: Option<DedupStrategy>,
    pub(crate) await_ready: bool,
    pub(crate) init: InitFn,
    pub(crate) deinit: Vec<Cleanup>,
    pub(crate) shortcuts: BTreeMap<String, String>,
}

impl VariantSpec {
    /// New variant around an init body. Defaults: no predicates, no dedup,
    /// waits for document readiness.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn(EvalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Activation, DynError>> + Send + 'static,
    {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            as_long_as: None,
            deduplicate: None,
            await_ready: true,
            init: Arc::new(move |cx| Box::pin(init(cx))),
            deinit: Vec::new(),
            shortcuts: BTreeMap::new(),
        }
    }

    /// Add an `include` predicate; all must hold for eligibility.
    pub fn include(mut self, predicate: Predicate) -> Self {
        self.include.push(predicate);
        self
    }

    /// Add an `exclude` predicate; any holding one disqualifies.
    pub fn exclude(mut self, predicate: Predicate) -> Self {
        self.exclude.push(predicate);
        self
    }

    /// Add a standing precondition, re-evaluated on every trigger. While
    /// false the variant is gated off and its effects are retired.
    pub fn as_long_as(mut self, predicate: Predicate) -> Self {
        self.as_long_as.get_or_insert_with(Vec::new).push(predicate);
        self
    }

    /// Deduplicate activations under the given strategy.
    pub fn deduplicate(mut self, strategy: DedupStrategy) -> Self {
        self.deduplicate = Some(strategy);
        self
    }

    /// Invoke immediately on the trigger instead of waiting for readiness.
    pub fn immediate(mut self) -> Self {
        self.await_ready = false;
        self
    }

    /// Register a cleanup callable to run when this variant is retired.
    pub fn deinit(mut self, cleanup: Cleanup) -> Self {
        self.deinit.push(cleanup);
        self
    }

    /// Attach shortcut metadata, passed through uninterpreted to the
    /// external shortcut registrar.
    pub fn shortcut(mut self, keys: impl Into<String>, description: impl Into<String>) -> Self {
        self.shortcuts.insert(keys.into(), description.into());
        self
    }

    pub fn awaits_ready(&self) -> bool {
        self.await_ready
    }

    pub fn dedup_strategy(&self) -> Option<&DedupStrategy> {
        self.deduplicate.as_ref()
    }

    pub fn has_gate(&self) -> bool {
        self.as_long_as.is_some()
    }
}

impl std::fmt::Debug for VariantSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantSpec")
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.len())
            .field("gated", &self.as_long_as.is_some())
            .field("deduplicate", &self.deduplicate)
            .field("await_ready", &self.await_ready)
            .finish_non_exhaustive()
    }
}

/// A named unit of optional behavior with one or more activation variants.
#[derive(Debug)]
pub struct FeatureDefinition {
    pub id: String,
    pub enabled: bool,
    pub variants: Vec<VariantSpec>,
}

/// Identity of one variant: owning feature id plus position in the
/// feature's registration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantId {
    feature: Arc<str>,
    index: usize,
}

impl VariantId {
    pub fn new(feature: &str, index: usize) -> Self {
        Self {
            feature: feature.into(),
            index,
        }
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.feature, self.index)
    }
}

/// Append-only startup collection of feature definitions.
#[derive(Default)]
pub struct FeatureRegistry {
    features: Vec<FeatureDefinition>,
    ids: HashSet<String>,
    frozen: bool,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature. Fails on a duplicate id or after the freeze
    /// boundary.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        variants: Vec<VariantSpec>,
    ) -> Result<(), RegistryError> {
        if self.frozen {
            return Err(RegistryError::RegistryFrozen);
        }
        let id = id.into();
        if !self.ids.insert(id.clone()) {
            return Err(RegistryError::DuplicateFeature(id));
        }
        debug!(feature = %id, variants = variants.len(), "feature registered");
        self.features.push(FeatureDefinition {
            id,
            enabled: true,
            variants,
        });
        Ok(())
    }

    /// Switch a registered feature off without removing it. Returns false
    /// when no feature carries the id.
    pub fn disable(&mut self, id: &str) -> bool {
        match self.features.iter_mut().find(|f| f.id == id) {
            Some(feature) => {
                feature.enabled = false;
                true
            }
            None => false,
        }
    }

    /// End the startup phase: no further registration is permitted once
    /// triggers begin processing.
    pub fn freeze(&mut self) -> Arc<FeatureSet> {
        self.frozen = true;
        let features = std::mem::take(&mut self.features);
        Arc::new(FeatureSet {
            features: features.into_iter().map(Arc::new).collect(),
        })
    }
}

/// Immutable, ordered feature collection produced at the freeze boundary.
pub struct FeatureSet {
    features: Vec<Arc<FeatureDefinition>>,
}

impl FeatureSet {
    /// All features in registration order, including disabled ones.
    pub fn all(&self) -> impl Iterator<Item = &Arc<FeatureDefinition>> {
        self.features.iter()
    }

    /// Enabled features in registration order. This is what the scheduler
    /// walks; disabled features are never evaluated.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<FeatureDefinition>> {
        self.features.iter().filter(|f| f.enabled)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<FeatureDefinition>> {
        self.features.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Aggregate the pass-through shortcut metadata of every registered
    /// variant into one map for the external shortcut registrar. First
    /// registration wins on key collisions.
    pub fn shortcuts(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for feature in &self.features {
            for variant in &feature.variants {
                for (keys, description) in &variant.shortcuts {
                    if map.contains_key(keys) {
                        debug!(feature = %feature.id, keys = %keys, "duplicate shortcut binding ignored");
                        continue;
                    }
                    map.insert(keys.clone(), description.clone());
                }
            }
        }
        map
    }
}
