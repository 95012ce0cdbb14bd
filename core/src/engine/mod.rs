//! Trigger dispatch and variant scheduling.
//!
//! The engine walks every enabled feature's variants on each trigger event
//! and drives the per-(variant, trigger) state machine:
//!
//! ```text
//! Pending → Evaluating → Skipped          include fails / exclude holds /
//!                      |                  key already claimed
//!                      → Gated            standing gate currently false
//!                      → Deferred         awaits readiness, none seen yet
//!                      → Retired          gate lapsed on a live activation
//!                      → Invoked → Active | Declined | Failed
//! ```
//!
//! Evaluation across variants is interleaved, not serialized: every
//! variant's predicate walk runs as its own future, so a hung predicate
//! stalls only the variants waiting on it. Invocations are spawned and not
//! awaited by `dispatch`; an init still in flight when the next trigger
//! begins is never cancelled and is expected to fail harmlessly if its
//! target content is gone. `quiesce` collects completed invocations.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDateTime;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hashbrown::HashMap;

use lamina_types::{Location, TriggerKind, UnkeyedRerun};

use crate::dedup::{ActivationRecord, ClaimTracker};
use crate::document::DocumentSurface;
use crate::error::InitError;
use crate::lifecycle::LifecycleManager;
use crate::predicate::{self, EvalContext, Mode};
use crate::registry::{Activation, FeatureDefinition, FeatureSet, VariantId, VariantSpec};


/// A trigger event delivered by the hosting environment.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// The document finished initial construction.
    Ready(Location),
    /// An in-place navigation completed.
    Navigation(Location),
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::Ready(_) => TriggerKind::Ready,
            Self::Navigation(_) => TriggerKind::Navigation,
        }
    }

    fn into_location(self) -> Location {
        match self {
            Self::Ready(location) | Self::Navigation(location) => location,
        }
    }
}

/// Engine-wide options.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineOptions {
    /// Re-run policy for variants with no dedup key and no standing gate.
    pub unkeyed_rerun: UnkeyedRerun,
}

/// Why a variant was skipped on this trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An `exclude` predicate held.
    Excluded,
    /// An `include` predicate did not hold.
    IncludeFailed,
    /// The dedup key is already claimed within its scope.
    AlreadyClaimed,
    /// The standing gate holds but a prior activation is still live.
    AlreadyActive,
    /// Unkeyed variant already ran under the `Once` re-run policy.
    AlreadyRan,
}

/// Where a variant ended up for one trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    Skipped(SkipReason),
    /// Standing gate false; re-checked on the next trigger.
    Gated,
    /// Gate lapsed on a live activation; cleanups were invoked.
    Retired,
    /// Awaits document readiness; picked up by the ready trigger.
    Deferred,
    /// Eligibility passed and the init body was spawned.
    Invoked,
}

/// Per-variant entry in a trigger report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantOutcome {
    pub feature: String,
    pub variant: usize,
    pub state: OutcomeState,
}

/// Evaluation summary for one processed trigger.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerReport {
    pub trigger: TriggerKind,
    pub epoch: u64,
    pub at: NaiveDateTime,
    pub outcomes: Vec<VariantOutcome>,
}

impl TriggerReport {
    pub fn outcome_for(&self, feature: &str, variant: usize) -> Option<&OutcomeState> {
        self.outcomes
            .iter()
            .find(|o| o.feature == feature && o.variant == variant)
            .map(|o| &o.state)
    }
}

/// Final classification of one spawned init invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationResult {
    Activated,
    Declined,
    Failed(String),
}

/// Completed invocation collected by `quiesce`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationOutcome {
    pub feature: String,
    pub variant: usize,
    pub result: ActivationResult,
    pub finished_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Idle,
    /// Init spawned, completion not yet observed.
    Invoking,
    /// Init completed with `Activated`; cleanups are registered.
    Active,
}

#[derive(Debug, Clone, Copy, Default)]
struct VariantRuntime {
    phase: Phase,
    ran_once: bool,
}

/// State shared with spawned invocation tasks.
struct EngineShared {
    claims: Mutex<ClaimTracker>,
    lifecycle: Mutex<LifecycleManager>,
    states: Mutex<HashMap<VariantId, VariantRuntime>>,
    inflight: Mutex<Vec<(VariantId, JoinHandle<InvocationOutcome>)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// The activation engine: registry walk, claim gating, invocation
/// scheduling, and lifecycle retirement, driven by external triggers.
pub struct Engine {
    features: Arc<FeatureSet>,
    document: Arc<dyn DocumentSurface>,
    options: EngineOptions,
    shared: Arc<EngineShared>,
    epoch: u64,
    ready_seen: bool,
}

impl Engine {
    pub fn new(
        features: Arc<FeatureSet>,
        document: Arc<dyn DocumentSurface>,
        options: EngineOptions,
    ) -> Self {
        let shared = Arc::new(EngineShared {
            claims: Mutex::new(ClaimTracker::new(Arc::clone(&document))),
            lifecycle: Mutex::new(LifecycleManager::new()),
            states: Mutex::new(HashMap::new()),
            inflight: Mutex::new(Vec::new()),
        });
        Self {
            features,
            document,
            options,
            shared,
            epoch: 0,
            ready_seen: false,
        }
    }

    pub fn features(&self) -> &Arc<FeatureSet> {
        &self.features
    }

    pub fn document(&self) -> &Arc<dyn DocumentSurface> {
        &self.document
    }

    /// Current navigation epoch. Increments on every navigation trigger.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Claim records taken by this engine, for diagnostics.
    pub fn claim_records(&self) -> Vec<ActivationRecord> {
        lock(&self.shared.claims).records().cloned().collect()
    }

    /// Process one trigger event: all variant evaluations run to
    /// completion (interleaved) before this returns; init invocations are
    /// spawned and keep running in the background.
    pub async fn dispatch(&mut self, trigger: Trigger) -> TriggerReport {
        let kind = trigger.kind();
        if kind == TriggerKind::Navigation {
            self.epoch += 1;
            lock(&self.shared.claims).begin_epoch(self.epoch);
        }
        if kind == TriggerKind::Ready {
            self.ready_seen = true;
        }
        let location = trigger.into_location();
        info!(kind = %kind, epoch = self.epoch, location = %location, "processing trigger");

        // The document may have been constructed before this engine
        // attached; its own readiness probe counts as much as a ready
        // trigger does.
        let ready = self.ready_seen || self.document.is_ready();
        let cx = EvalContext::new(location, Arc::clone(&self.document), kind, self.epoch);

        let mut walk: FuturesUnordered<_> = FuturesUnordered::new();
        for (ord, feature) in self.features.enabled().enumerate() {
            for index in 0..feature.variants.len() {
                let fut = evaluate_variant(
                    Arc::clone(feature),
                    index,
                    cx.clone(),
                    Arc::clone(&self.shared),
                    self.options,
                    ready,
                );
                walk.push(async move { (ord, fut.await) });
            }
        }

        let mut keyed: Vec<(usize, VariantOutcome)> = Vec::new();
        while let Some(entry) = walk.next().await {
            keyed.push(entry);
        }
        // Completion order varies with predicate latency; reports list
        // variants in registration order.
        keyed.sort_by(|a, b| (a.0, a.1.variant).cmp(&(b.0, b.1.variant)));

        TriggerReport {
            trigger: kind,
            epoch: self.epoch,
            at: now(),
            outcomes: keyed.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    /// Await every spawned invocation and collect its final outcome.
    pub async fn quiesce(&mut self) -> Vec<InvocationOutcome> {
        let handles: Vec<(VariantId, JoinHandle<InvocationOutcome>)> = {
            let mut inflight = lock(&self.shared.inflight);
            inflight.drain(..).collect()
        };
        let mut outcomes = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    warn!(variant = %id, error = %err, "init task aborted");
                    outcomes.push(InvocationOutcome {
                        feature: id.feature().to_string(),
                        variant: id.index(),
                        result: ActivationResult::Failed(err.to_string()),
                        finished_at: now(),
                    });
                }
            }
        }
        outcomes
    }

    /// Tear the engine down: drain invocations, retire every remaining
    /// lifecycle registration, and release all claims.
    pub async fn shutdown(&mut self) -> Vec<InvocationOutcome> {
        let outcomes = self.quiesce().await;
        lock(&self.shared.lifecycle).retire_all();
        lock(&self.shared.claims).release_all();
        lock(&self.shared.states).clear();
        info!("engine torn down");
        outcomes
    }
}

/// Walk one variant through the state machine for one trigger.
async fn evaluate_variant(
    feature: Arc<FeatureDefinition>,
    index: usize,
    cx: EvalContext,
    shared: Arc<EngineShared>,
    options: EngineOptions,
    ready_seen: bool,
) -> VariantOutcome {
    let id = VariantId::new(&feature.id, index);
    let spec = &feature.variants[index];

    // Standing gate first: a false reading retires a live activation and
    // re-queues the variant for the next trigger.
    if let Some(gate) = &spec.as_long_as {
        if !predicate::evaluate(gate, Mode::All, &cx).await {
            let phase = current_phase(&shared, &id);
            if phase == Phase::Active {
                retire_variant(&shared, &id, spec, &feature.id);
                return outcome(&feature.id, index, OutcomeState::Retired);
            }
            return outcome(&feature.id, index, OutcomeState::Gated);
        }
        if current_phase(&shared, &id) != Phase::Idle {
            return outcome(
                &feature.id,
                index,
                OutcomeState::Skipped(SkipReason::AlreadyActive),
            );
        }
    }

    if !spec.exclude.is_empty() && predicate::evaluate(&spec.exclude, Mode::Any, &cx).await {
        return outcome(
            &feature.id,
            index,
            OutcomeState::Skipped(SkipReason::Excluded),
        );
    }
    if !predicate::evaluate(&spec.include, Mode::All, &cx).await {
        return outcome(
            &feature.id,
            index,
            OutcomeState::Skipped(SkipReason::IncludeFailed),
        );
    }

    // Invocation waits for the document-ready trigger; the ready walk
    // re-evaluates eligibility and picks the variant up then.
    if spec.awaits_ready() && !ready_seen {
        return outcome(&feature.id, index, OutcomeState::Deferred);
    }

    if spec.dedup_strategy().is_none()
        && !spec.has_gate()
        && options.unkeyed_rerun == UnkeyedRerun::Once
        && lock(&shared.states)
            .get(&id)
            .map(|s| s.ran_once)
            .unwrap_or(false)
    {
        return outcome(
            &feature.id,
            index,
            OutcomeState::Skipped(SkipReason::AlreadyRan),
        );
    }

    let state = begin_invocation(&feature, index, &id, &cx, &shared);
    outcome(&feature.id, index, state)
}

fn outcome(feature: &str, variant: usize, state: OutcomeState) -> VariantOutcome {
    VariantOutcome {
        feature: feature.to_string(),
        variant,
        state,
    }
}

fn current_phase(shared: &EngineShared, id: &VariantId) -> Phase {
    lock(&shared.states)
        .get(id)
        .map(|s| s.phase)
        .unwrap_or_default()
}

/// Claim-and-spawn step. Synchronous: no suspension point between the
/// claim check and the marker placement, so interleaved evaluations of the
/// same key cannot both proceed.
fn begin_invocation(
    feature: &Arc<FeatureDefinition>,
    index: usize,
    id: &VariantId,
    cx: &EvalContext,
    shared: &Arc<EngineShared>,
) -> OutcomeState {
    let spec = &feature.variants[index];
    let claim_key = spec
        .dedup_strategy()
        .map(|s| (s.effective_key(&feature.id), s.scope()));

    if let Some((key, scope)) = &claim_key
        && !lock(&shared.claims).try_claim(key, *scope, cx.epoch())
    {
        return OutcomeState::Skipped(SkipReason::AlreadyClaimed);
    }

    {
        let mut states = lock(&shared.states);
        let state = states.entry(id.clone()).or_default();
        state.phase = Phase::Invoking;
        state.ran_once = true;
    }

    debug!(variant = %id, "invoking init");
    let handle = tokio::spawn(run_init(
        Arc::clone(feature),
        index,
        id.clone(),
        cx.clone(),
        Arc::clone(shared),
        claim_key.map(|(key, _)| key),
    ));
    lock(&shared.inflight).push((id.clone(), handle));
    OutcomeState::Invoked
}

async fn run_init(
    feature: Arc<FeatureDefinition>,
    index: usize,
    id: VariantId,
    cx: EvalContext,
    shared: Arc<EngineShared>,
    claim_key: Option<String>,
) -> InvocationOutcome {
    let spec = &feature.variants[index];
    let result = match (spec.init)(cx).await {
        Ok(Activation::Activated) => {
            lock(&shared.lifecycle).register(id.clone(), spec.deinit.clone());
            if let Some(state) = lock(&shared.states).get_mut(&id) {
                state.phase = Phase::Active;
            }
            debug!(variant = %id, "variant active");
            ActivationResult::Activated
        }
        Ok(Activation::Declined) => {
            abandon(&shared, &id, claim_key.as_deref());
            debug!(variant = %id, "variant declined activation");
            ActivationResult::Declined
        }
        Err(source) => {
            let message = source.to_string();
            let err = InitError {
                variant: id.to_string(),
                source,
            };
            warn!(error = %err, "init failed; variant stays eligible for future triggers");
            abandon(&shared, &id, claim_key.as_deref());
            ActivationResult::Failed(message)
        }
    };
    InvocationOutcome {
        feature: feature.id.clone(),
        variant: index,
        result,
        finished_at: now(),
    }
}

/// Roll a non-activation back: no record survives a declined or failed
/// init, so the variant remains eligible on a future trigger.
fn abandon(shared: &EngineShared, id: &VariantId, claim_key: Option<&str>) {
    if let Some(key) = claim_key {
        lock(&shared.claims).release(key);
    }
    if let Some(state) = lock(&shared.states).get_mut(id) {
        state.phase = Phase::Idle;
        state.ran_once = false;
    }
}

fn retire_variant(shared: &EngineShared, id: &VariantId, spec: &VariantSpec, feature_id: &str) {
    lock(&shared.lifecycle).retire(id);
    if let Some(strategy) = spec.dedup_strategy() {
        lock(&shared.claims).release(&strategy.effective_key(feature_id));
    }
    if let Some(state) = lock(&shared.states).get_mut(id) {
        state.phase = Phase::Idle;
    }
}
