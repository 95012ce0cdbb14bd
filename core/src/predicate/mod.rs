//! Predicate evaluation.
//!
//! Predicates are the page/state classifiers supplied by feature modules.
//! The engine treats them as opaque: a named callable over a context
//! snapshot that resolves to a boolean. Sets of predicates are combined in
//! two modes:
//! - `All`: every predicate must hold (eligibility `include` sets, gates)
//! - `Any`: one holding predicate disqualifies/matches (`exclude` sets)
//!
//! All futures in a set are polled concurrently and the first decisive
//! result short-circuits the rest. Failure is fail-closed: an erroring
//! predicate counts as `false` in `All` mode and is ignored (never `true`)
//! in `Any` mode, so a buggy classifier can never over-activate a feature.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::warn;

use lamina_types::{Location, TriggerKind};

use crate::document::DocumentSurface;
use crate::error::{DynError, PredicateError};

#[cfg(test)]
mod evaluator_tests;

/// Boxed future a predicate resolves to.
pub type PredicateFuture = Pin<Box<dyn Future<Output = Result<bool, DynError>> + Send>>;

struct ContextInner {
    location: Location,
    document: Arc<dyn DocumentSurface>,
    trigger: TriggerKind,
    epoch: u64,
}

/// Snapshot of current location and document state handed to predicates
/// and init bodies. Cheap to clone.
#[derive(Clone)]
pub struct EvalContext {
    inner: Arc<ContextInner>,
}

impl EvalContext {
    pub fn new(
        location: Location,
        document: Arc<dyn DocumentSurface>,
        trigger: TriggerKind,
        epoch: u64,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                location,
                document,
                trigger,
                epoch,
            }),
        }
    }

    pub fn location(&self) -> &Location {
        &self.inner.location
    }

    pub fn document(&self) -> &Arc<dyn DocumentSurface> {
        &self.inner.document
    }

    pub fn trigger(&self) -> TriggerKind {
        self.inner.trigger
    }

    /// Navigation epoch the snapshot belongs to. Increments on every
    /// navigation trigger.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("location", &self.inner.location)
            .field("trigger", &self.inner.trigger)
            .field("epoch", &self.inner.epoch)
            .finish_non_exhaustive()
    }
}

/// A named boolean classifier over the current context.
#[derive(Clone)]
pub struct Predicate {
    name: Arc<str>,
    eval: Arc<dyn Fn(EvalContext) -> PredicateFuture + Send + Sync>,
}

impl Predicate {
    /// Predicate from an infallible synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&EvalContext) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into().into(),
            eval: Arc::new(move |cx| {
                let verdict = f(&cx);
                Box::pin(std::future::ready(Ok(verdict)))
            }),
        }
    }

    /// Predicate from an async (possibly failing) closure.
    pub fn from_async<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(EvalContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, DynError>> + Send + 'static,
    {
        Self {
            name: name.into().into(),
            eval: Arc::new(move |cx| Box::pin(f(cx))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, cx: EvalContext) -> PredicateFuture {
        (self.eval)(cx)
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Combination mode for a predicate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every predicate must resolve true.
    All,
    /// At least one predicate must resolve true.
    Any,
}

/// Evaluate a predicate set concurrently with decisive short-circuit.
///
/// An empty set is vacuously true for `All` and false for `Any`. Errors are
/// reported through tracing and never propagate to the caller.
pub async fn evaluate(predicates: &[Predicate], mode: Mode, cx: &EvalContext) -> bool {
    if predicates.is_empty() {
        return mode == Mode::All;
    }

    let mut pending: FuturesUnordered<_> = predicates
        .iter()
        .map(|p| {
            let name = p.name.clone();
            let fut = p.call(cx.clone());
            async move { (name, fut.await) }
        })
        .collect();

    // Dropping `pending` on a decisive result cancels the still-running
    // predicates for this set only; other variants keep evaluating.
    while let Some((name, verdict)) = pending.next().await {
        match verdict {
            Ok(true) => {
                if mode == Mode::Any {
                    return true;
                }
            }
            Ok(false) => {
                if mode == Mode::All {
                    return false;
                }
            }
            Err(source) => {
                let err = PredicateError {
                    name: name.to_string(),
                    source,
                };
                warn!(error = %err, "predicate failed; treating as not matching");
                if mode == Mode::All {
                    return false;
                }
            }
        }
    }

    mode == Mode::All
}
