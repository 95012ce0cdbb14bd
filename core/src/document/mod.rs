//! Host document surface.
//!
//! The document is externally owned and continuously mutated by the host;
//! the engine never holds a lock over it. This module defines the narrow
//! surface the engine needs:
//! - **Readiness**: has the document finished initial construction?
//! - **Markers**: the claim protocol tokens written onto the document,
//!   which are simultaneously the claim record and its durable evidence.
//! - **Annotations**: the augmentation payload demo features attach, so
//!   the harness has something observable to show.
//!
//! `MemoryDocument` is the in-memory implementation used by the harness
//! and tests. A real host binds this trait to its own document store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use hashbrown::HashSet;

/// Narrow view of the shared mutable document.
///
/// All methods are synchronous: marker check-and-set must complete without
/// an intervening suspension point so interleaved variant evaluations can
/// never both observe a marker as absent.
pub trait DocumentSurface: Send + Sync {
    /// True once the document finished initial construction.
    fn is_ready(&self) -> bool;

    /// True when the marker token is present on the document.
    fn has_marker(&self, marker: &str) -> bool;

    /// Write a marker token onto the document.
    fn place_marker(&self, marker: &str);

    /// Remove a marker token from the document.
    fn clear_marker(&self, marker: &str);

    /// All marker tokens currently present, sorted, for inspection.
    fn markers(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    ready: bool,
    markers: HashSet<String>,
    annotations: BTreeMap<String, String>,
}

/// In-memory document used by the harness and tests.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    inner: Mutex<MemoryInner>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the document as finished constructing.
    pub fn set_ready(&self, ready: bool) {
        self.lock().ready = ready;
    }

    /// Attach an augmentation payload under a name.
    pub fn annotate(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().annotations.insert(name.into(), value.into());
    }

    /// Remove an augmentation payload.
    pub fn remove_annotation(&self, name: &str) {
        self.lock().annotations.remove(name);
    }

    /// Current annotations, for inspection.
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.lock().annotations.clone()
    }

    /// Simulate the host rebuilding the document from scratch: readiness is
    /// kept, but markers and annotations are gone. Claim state must then be
    /// recoverable purely from what a re-read of the document shows.
    pub fn reconstruct(&self) {
        let mut inner = self.lock();
        inner.markers.clear();
        inner.annotations.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DocumentSurface for MemoryDocument {
    fn is_ready(&self) -> bool {
        self.lock().ready
    }

    fn has_marker(&self, marker: &str) -> bool {
        self.lock().markers.contains(marker)
    }

    fn place_marker(&self, marker: &str) {
        self.lock().markers.insert(marker.to_string());
    }

    fn clear_marker(&self, marker: &str) {
        self.lock().markers.remove(marker);
    }

    fn markers(&self) -> Vec<String> {
        let mut markers: Vec<String> = self.lock().markers.iter().cloned().collect();
        markers.sort();
        markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_round_trip() {
        let doc = MemoryDocument::new();
        assert!(!doc.has_marker("data-lamina-applied-x"));

        doc.place_marker("data-lamina-applied-x");
        assert!(doc.has_marker("data-lamina-applied-x"));

        doc.clear_marker("data-lamina-applied-x");
        assert!(!doc.has_marker("data-lamina-applied-x"));
    }

    #[test]
    fn test_markers_listing_is_sorted() {
        let doc = MemoryDocument::new();
        doc.place_marker("b");
        doc.place_marker("a");
        assert_eq!(doc.markers(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_reconstruct_drops_markers_but_keeps_readiness() {
        let doc = MemoryDocument::new();
        doc.set_ready(true);
        doc.place_marker("m");
        doc.annotate("banner", "hello");

        doc.reconstruct();
        assert!(doc.is_ready());
        assert!(!doc.has_marker("m"));
        assert!(doc.annotations().is_empty());
    }
}
