//! Claim scope and marker naming for the dedup protocol.
//!
//! A claim is recorded by writing a marker token onto the host document
//! itself. The marker doubles as externally inspectable proof that a
//! feature's logic already ran: any tool can reconstruct claim state by
//! re-reading the document, with no access to engine internals.

use serde::{Deserialize, Serialize};

/// Prefix for all markers the engine writes onto the host document.
pub const MARKER_PREFIX: &str = "data-lamina-applied-";

/// Build the document marker for a claim key.
pub fn marker_for_key(key: &str) -> String {
    format!("{MARKER_PREFIX}{key}")
}

/// How long a dedup claim survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimScope {
    /// Claim persists until explicit release or engine teardown.
    #[default]
    Process,
    /// Claim implicitly clears when the next navigation trigger starts.
    Epoch,
}
