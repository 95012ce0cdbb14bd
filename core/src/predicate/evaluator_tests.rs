//! Tests for predicate set evaluation.
//!
//! Verifies combination modes, short-circuiting, and fail-closed error
//! handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EvalContext, Mode, Predicate, evaluate};
use crate::document::MemoryDocument;
use lamina_types::{Location, TriggerKind};

fn cx() -> EvalContext {
    EvalContext::new(
        Location::parse("/test"),
        Arc::new(MemoryDocument::new()),
        TriggerKind::Ready,
        0,
    )
}

fn always(name: &str, verdict: bool) -> Predicate {
    Predicate::from_fn(name, move |_| verdict)
}

fn failing(name: &str) -> Predicate {
    Predicate::from_async(name, |_| async { Err("boom".into()) })
}

#[tokio::test]
async fn test_all_mode_requires_every_predicate() {
    assert!(evaluate(&[always("a", true), always("b", true)], Mode::All, &cx()).await);
    assert!(!evaluate(&[always("a", true), always("b", false)], Mode::All, &cx()).await);
}

#[tokio::test]
async fn test_any_mode_requires_one_predicate() {
    assert!(evaluate(&[always("a", false), always("b", true)], Mode::Any, &cx()).await);
    assert!(!evaluate(&[always("a", false), always("b", false)], Mode::Any, &cx()).await);
}

#[tokio::test]
async fn test_empty_set_semantics() {
    assert!(evaluate(&[], Mode::All, &cx()).await);
    assert!(!evaluate(&[], Mode::Any, &cx()).await);
}

#[tokio::test]
async fn test_error_is_fail_closed_in_all_mode() {
    assert!(!evaluate(&[always("ok", true), failing("bad")], Mode::All, &cx()).await);
}

#[tokio::test]
async fn test_error_never_contributes_true_in_any_mode() {
    assert!(!evaluate(&[failing("bad"), always("no", false)], Mode::Any, &cx()).await);
    // An error plus a genuine match still matches
    assert!(evaluate(&[failing("bad"), always("yes", true)], Mode::Any, &cx()).await);
}

#[tokio::test]
async fn test_all_mode_short_circuits_without_waiting() {
    // A predicate that would never resolve is abandoned once a sibling
    // resolves false.
    let hung = Predicate::from_async("hung", |_| async {
        std::future::pending::<()>().await;
        Ok(true)
    });
    assert!(!evaluate(&[always("no", false), hung], Mode::All, &cx()).await);
}

#[tokio::test]
async fn test_async_predicate_sees_context() {
    let seen = Arc::new(AtomicUsize::new(0));
    let seen2 = Arc::clone(&seen);
    let p = Predicate::from_async("path-check", move |cx: EvalContext| {
        let seen = Arc::clone(&seen2);
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(cx.location().path_is("/test"))
        }
    });
    assert!(evaluate(&[p], Mode::All, &cx()).await);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}
