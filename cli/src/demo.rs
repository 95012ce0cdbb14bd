//! Demo feature set for the interactive harness.
//!
//! Four small features that exercise the activation paths against the
//! in-memory document: include/exclude eligibility, process- and
//! epoch-scoped dedup, a standing gate with cleanup, and declination.
//! Each init attaches an annotation so the harness has something visible
//! to inspect; each deinit removes it again.

use std::sync::Arc;

use lamina_core::document::MemoryDocument;
use lamina_core::error::RegistryError;
use lamina_core::predicate::Predicate;
use lamina_core::registry::{
    Activation, Cleanup, DedupStrategy, FeatureRegistry, VariantSpec,
};

/// Register the demo features against the given document.
pub fn register_features(
    registry: &mut FeatureRegistry,
    document: &Arc<MemoryDocument>,
) -> Result<(), RegistryError> {
    // Banner on issue pages. Claimed for the whole process: navigating
    // away and back must not stack a second banner.
    let doc = Arc::clone(document);
    let doc_cleanup = Arc::clone(document);
    registry.register(
        "issue-banner",
        vec![
            VariantSpec::new(move |_cx| {
                let doc = Arc::clone(&doc);
                async move {
                    doc.annotate("issue-banner", "triage hints shown");
                    Ok(Activation::Activated)
                }
            })
            .include(Predicate::from_fn("is-issue-page", |cx| {
                cx.location().path_starts_with("/issues")
            }))
            .deduplicate(DedupStrategy::process())
            .deinit(Cleanup::infallible(move || {
                doc_cleanup.remove_annotation("issue-banner");
            }))
            .shortcut("g i", "Go to the issues listing"),
        ],
    )?;

    // Bulk-select controls on the notifications page. Epoch-scoped: each
    // navigation rebuilds the list, so the claim resets with it.
    let doc = Arc::clone(document);
    let doc_cleanup = Arc::clone(document);
    registry.register(
        "select-notifications",
        vec![
            VariantSpec::new(move |_cx| {
                let doc = Arc::clone(&doc);
                async move {
                    doc.annotate("select-notifications", "bulk-select menu attached");
                    Ok(Activation::Activated)
                }
            })
            .include(Predicate::from_fn("is-notifications", |cx| {
                cx.location().path_is("/notifications")
            }))
            .exclude(Predicate::from_fn("inbox-empty", |cx| {
                cx.location().has_query("empty")
            }))
            .deduplicate(DedupStrategy::epoch())
            .deinit(Cleanup::infallible(move || {
                doc_cleanup.remove_annotation("select-notifications");
            }))
            .shortcut("S", "Open the bulk-select menu"),
        ],
    )?;

    // Ribbon shown only while the debug query flag is present. Runs
    // immediately on the trigger; retires the moment the flag is gone.
    let doc = Arc::clone(document);
    let doc_cleanup = Arc::clone(document);
    registry.register(
        "debug-ribbon",
        vec![
            VariantSpec::new(move |_cx| {
                let doc = Arc::clone(&doc);
                async move {
                    doc.annotate("debug-ribbon", "debug overlay visible");
                    Ok(Activation::Activated)
                }
            })
            .as_long_as(Predicate::from_fn("debug-flag", |cx| {
                cx.location().has_query("debug")
            }))
            .immediate()
            .deduplicate(DedupStrategy::process())
            .deinit(Cleanup::infallible(move || {
                doc_cleanup.remove_annotation("debug-ribbon");
            })),
        ],
    )?;

    // Declines activation unless the page carries the lucky flag, which
    // leaves it eligible again on every later trigger.
    let doc = Arc::clone(document);
    registry.register(
        "lucky-badge",
        vec![
            VariantSpec::new(move |cx| {
                let doc = Arc::clone(&doc);
                async move {
                    if !cx.location().has_query("lucky") {
                        return Ok(Activation::Declined);
                    }
                    doc.annotate("lucky-badge", "badge awarded");
                    Ok(Activation::Activated)
                }
            })
            .deduplicate(DedupStrategy::process()),
        ],
    )?;

    Ok(())
}
