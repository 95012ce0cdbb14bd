//! Marker-backed claim tracking.
//!
//! The claim-and-mark protocol is the engine's only coordination mechanism
//! over the shared document: a placed marker is simultaneously the claim
//! record and its durable evidence. `try_claim` is synchronous and performs
//! check-and-set in one uninterrupted step, so two interleaved variant
//! evaluations can never both observe a key as unclaimed.
//!
//! The document, not the in-memory index, is the source of truth: a marker
//! cleared externally (for instance because the host rebuilt the page)
//! makes the key claimable again, and a marker placed by an earlier engine
//! instance keeps the key claimed even though this tracker never recorded
//! it.

use chrono::NaiveDateTime;
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::debug;

use lamina_types::{ClaimScope, marker_for_key};

use crate::document::DocumentSurface;

/// Book-keeping entry for one taken claim.
#[derive(Debug, Clone)]
pub struct ActivationRecord {
    pub key: String,
    pub scope: ClaimScope,
    /// Navigation epoch the claim was taken in
    pub epoch: u64,
    pub claimed_at: NaiveDateTime,
}

/// Tracks dedup claims against the document's marker surface.
pub struct ClaimTracker {
    document: Arc<dyn DocumentSurface>,
    records: HashMap<String, ActivationRecord>,
}

impl ClaimTracker {
    pub fn new(document: Arc<dyn DocumentSurface>) -> Self {
        Self {
            document,
            records: HashMap::new(),
        }
    }

    /// Atomically check and take a claim. Returns true only when the key
    /// was not yet claimed; the marker is placed in the same step.
    pub fn try_claim(&mut self, key: &str, scope: ClaimScope, epoch: u64) -> bool {
        let marker = marker_for_key(key);
        if self.document.has_marker(&marker) {
            return false;
        }
        self.document.place_marker(&marker);
        self.records.insert(
            key.to_string(),
            ActivationRecord {
                key: key.to_string(),
                scope,
                epoch,
                claimed_at: chrono::Local::now().naive_local(),
            },
        );
        debug!(key = %key, scope = ?scope, epoch, "claim taken");
        true
    }

    /// Clear a claim: marker and record both go away.
    pub fn release(&mut self, key: &str) {
        self.document.clear_marker(&marker_for_key(key));
        if self.records.remove(key).is_some() {
            debug!(key = %key, "claim released");
        }
    }

    /// Start a new navigation epoch: epoch-scoped claims implicitly clear.
    pub fn begin_epoch(&mut self, epoch: u64) {
        let expired: Vec<String> = self
            .records
            .values()
            .filter(|r| r.scope == ClaimScope::Epoch)
            .map(|r| r.key.clone())
            .collect();
        for key in expired {
            debug!(key = %key, epoch, "epoch claim expired");
            self.release(&key);
        }
    }

    /// Claim state as the document evidences it.
    pub fn is_claimed(&self, key: &str) -> bool {
        self.document.has_marker(&marker_for_key(key))
    }

    /// Release every claim this tracker took. Used at teardown.
    pub fn release_all(&mut self) {
        let keys: Vec<String> = self.records.keys().cloned().collect();
        for key in keys {
            self.release(&key);
        }
    }

    /// Current records, for diagnostics. Only claims this tracker took are
    /// listed; externally placed markers still gate `try_claim` without
    /// appearing here.
    pub fn records(&self) -> impl Iterator<Item = &ActivationRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::{DocumentSurface, MemoryDocument};
    use lamina_types::{ClaimScope, marker_for_key};

    fn tracker() -> (Arc<MemoryDocument>, ClaimTracker) {
        let doc = Arc::new(MemoryDocument::new());
        let tracker = ClaimTracker::new(doc.clone() as Arc<dyn DocumentSurface>);
        (doc, tracker)
    }

    #[test]
    fn test_claim_takes_once() {
        let (_doc, mut tracker) = tracker();
        assert!(tracker.try_claim("f1", ClaimScope::Process, 0));
        assert!(!tracker.try_claim("f1", ClaimScope::Process, 0));
        assert!(tracker.is_claimed("f1"));
    }

    #[test]
    fn test_claim_places_inspectable_marker() {
        let (doc, mut tracker) = tracker();
        tracker.try_claim("f1", ClaimScope::Process, 0);
        assert!(doc.has_marker(&marker_for_key("f1")));
    }

    #[test]
    fn test_release_clears_marker_and_record() {
        let (doc, mut tracker) = tracker();
        tracker.try_claim("f1", ClaimScope::Process, 0);
        tracker.release("f1");
        assert!(!doc.has_marker(&marker_for_key("f1")));
        assert!(tracker.try_claim("f1", ClaimScope::Process, 1));
    }

    #[test]
    fn test_epoch_scope_expires_on_new_epoch() {
        let (_doc, mut tracker) = tracker();
        tracker.try_claim("per-page", ClaimScope::Epoch, 0);
        tracker.try_claim("forever", ClaimScope::Process, 0);

        tracker.begin_epoch(1);
        assert!(tracker.try_claim("per-page", ClaimScope::Epoch, 1));
        assert!(!tracker.try_claim("forever", ClaimScope::Process, 1));
    }

    #[test]
    fn test_document_is_source_of_truth() {
        let (doc, mut tracker) = tracker();
        tracker.try_claim("f1", ClaimScope::Process, 0);

        // Host rebuilt the page: marker evidence is gone, key is claimable
        doc.clear_marker(&marker_for_key("f1"));
        assert!(!tracker.is_claimed("f1"));
        assert!(tracker.try_claim("f1", ClaimScope::Process, 0));

        // Marker placed by someone else gates the claim without a record
        doc.place_marker(&marker_for_key("foreign"));
        assert!(!tracker.try_claim("foreign", ClaimScope::Process, 0));
    }

    #[test]
    fn test_release_all() {
        let (doc, mut tracker) = tracker();
        tracker.try_claim("a", ClaimScope::Process, 0);
        tracker.try_claim("b", ClaimScope::Epoch, 0);
        tracker.release_all();
        assert!(doc.markers().is_empty());
    }
}
