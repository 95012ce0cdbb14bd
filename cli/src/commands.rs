//! Command implementations for the interactive harness.

use std::sync::Arc;

use tokio::sync::RwLock;

use lamina_core::document::{DocumentSurface, MemoryDocument};
use lamina_core::engine::{Engine, InvocationOutcome, Trigger, TriggerReport};
use lamina_types::{HarnessSettings, Location};

/// Mutable harness state shared across commands.
pub struct Harness {
    pub engine: Engine,
    pub document: Arc<MemoryDocument>,
    pub settings: HarnessSettings,
    pub last_report: Option<TriggerReport>,
    pub completions: Vec<InvocationOutcome>,
    pub torn_down: bool,
}

fn print_report(report: &TriggerReport) {
    println!(
        "trigger={} epoch={} variants={}",
        report.trigger,
        report.epoch,
        report.outcomes.len()
    );
    for outcome in &report.outcomes {
        println!(
            "  {}[{}] -> {:?}",
            outcome.feature, outcome.variant, outcome.state
        );
    }
}

async fn fire(state: Arc<RwLock<Harness>>, trigger: Trigger) -> Result<(), String> {
    let mut harness = state.write().await;
    if harness.torn_down {
        return Err("engine already torn down\n".to_string());
    }
    let report = harness.engine.dispatch(trigger).await;
    print_report(&report);
    harness.last_report = Some(report);
    Ok(())
}

/// Fire the initial document-ready trigger.
pub async fn ready(path: Option<&str>, state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let location = {
        let harness = state.read().await;
        let path = path
            .map(str::to_string)
            .or_else(|| harness.settings.start_location.clone())
            .unwrap_or_else(|| "/".to_string());
        harness.document.set_ready(true);
        Location::parse(&path)
    };
    fire(state, Trigger::Ready(location)).await
}

/// Fire an in-place navigation trigger.
pub async fn navigate(path: &str, state: Arc<RwLock<Harness>>) -> Result<(), String> {
    fire(state, Trigger::Navigation(Location::parse(path))).await
}

/// Show marker tokens currently on the document.
pub async fn markers(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    let markers = harness.document.markers();
    if markers.is_empty() {
        println!("no markers");
    }
    for marker in markers {
        println!("{marker}");
    }
    Ok(())
}

/// Show annotations the demo features attached.
pub async fn annotations(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    let annotations = harness.document.annotations();
    if annotations.is_empty() {
        println!("no annotations");
    }
    for (name, value) in annotations {
        println!("{name}: {value}");
    }
    Ok(())
}

/// Show the last trigger report.
pub async fn report(json: bool, state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    match &harness.last_report {
        Some(report) if json => {
            let rendered = serde_json::to_string_pretty(report).map_err(|e| e.to_string())?;
            println!("{rendered}");
        }
        Some(report) => print_report(report),
        None => println!("no trigger processed yet"),
    }
    Ok(())
}

/// Await in-flight invocations and show their outcomes.
pub async fn quiesce(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let mut harness = state.write().await;
    let outcomes = harness.engine.quiesce().await;
    if outcomes.is_empty() {
        println!("no invocations in flight");
    }
    for outcome in &outcomes {
        println!(
            "{}[{}] -> {:?}",
            outcome.feature, outcome.variant, outcome.result
        );
    }
    harness.completions.extend(outcomes);
    Ok(())
}

/// List registered features and their variant shapes.
pub async fn features(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    for feature in harness.engine.features().all() {
        let status = if feature.enabled { "" } else { " (disabled)" };
        println!("{}{} [{} variant(s)]", feature.id, status, feature.variants.len());
    }
    Ok(())
}

/// Show aggregated shortcut metadata.
pub async fn shortcuts(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    let shortcuts = harness.engine.features().shortcuts();
    if shortcuts.is_empty() {
        println!("no shortcuts registered");
    }
    for (keys, description) in shortcuts {
        println!("{keys}: {description}");
    }
    Ok(())
}

/// Show claim records the engine took.
pub async fn claims(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    let mut records = harness.engine.claim_records();
    records.sort_by(|a, b| a.key.cmp(&b.key));
    if records.is_empty() {
        println!("no claims taken");
    }
    for record in records {
        println!(
            "{} scope={:?} epoch={} at={}",
            record.key, record.scope, record.epoch, record.claimed_at
        );
    }
    Ok(())
}

/// Simulate the host rebuilding the document from scratch.
pub async fn reconstruct(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let harness = state.read().await;
    harness.document.reconstruct();
    println!("document reconstructed; markers and annotations dropped");
    Ok(())
}

/// Tear the engine down: retire all cleanups, release all claims.
pub async fn teardown(state: Arc<RwLock<Harness>>) -> Result<(), String> {
    let mut harness = state.write().await;
    if harness.torn_down {
        return Err("engine already torn down\n".to_string());
    }
    let outcomes = harness.engine.shutdown().await;
    println!("torn down; {} invocation(s) drained", outcomes.len());
    harness.completions.extend(outcomes);
    harness.torn_down = true;
    Ok(())
}
