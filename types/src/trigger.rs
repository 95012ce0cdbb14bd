//! Trigger event kinds delivered by the hosting environment.

use serde::{Deserialize, Serialize};

/// The two external occurrences that cause a full re-walk of all variants.
/// Detection is the host's concern; the engine only consumes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The document finished initial construction.
    Ready,
    /// An in-place navigation completed without a full reload.
    Navigation,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Navigation => write!(f, "navigation"),
        }
    }
}
