//! Persisted harness settings.
//!
//! Loaded from a TOML config file by the CLI harness. Every field has a
//! serde default so older config files keep parsing after new fields land.

use serde::{Deserialize, Serialize};

/// Whether a variant with no dedup key and no standing gate re-runs its
/// init on every trigger event. The original behavior is `EveryTrigger`
/// (effects are assumed idempotent); `Once` runs such variants a single
/// time per engine lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnkeyedRerun {
    #[default]
    EveryTrigger,
    Once,
}

/// Settings for the interactive harness.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Location used by `ready` when none is given on the command line
    #[serde(default)]
    pub start_location: Option<String>,

    /// Re-run policy for unkeyed, ungated variants
    #[serde(default)]
    pub unkeyed_rerun: UnkeyedRerun,

    /// Feature ids switched off without touching code
    #[serde(default)]
    pub disabled_features: Vec<String>,
}
