//! Cleanup registration and retirement.
//!
//! Successfully activated variants hand their deinit callables to the
//! lifecycle manager. Retirement happens when a variant's standing gate
//! flips false, and at engine teardown for everything still registered.
//! Each cleanup is isolated: one failing callable never blocks the others.

use hashbrown::HashMap;
use tracing::{debug, warn};

use crate::error::CleanupError;
use crate::registry::{Cleanup, VariantId};

#[derive(Default)]
pub struct LifecycleManager {
    registrations: HashMap<VariantId, Vec<Cleanup>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind cleanup callables to an activated variant instance. Registering
    /// again extends the existing binding.
    pub fn register(&mut self, id: VariantId, cleanups: Vec<Cleanup>) {
        if cleanups.is_empty() {
            return;
        }
        self.registrations.entry(id).or_default().extend(cleanups);
    }

    /// Invoke and discard all cleanups bound to the variant. Returns how
    /// many callables ran (including ones that failed).
    pub fn retire(&mut self, id: &VariantId) -> usize {
        let Some(cleanups) = self.registrations.remove(id) else {
            return 0;
        };
        let count = cleanups.len();
        debug!(variant = %id, cleanups = count, "retiring variant");
        for cleanup in cleanups {
            if let Err(source) = cleanup.invoke() {
                let err = CleanupError {
                    variant: id.to_string(),
                    source,
                };
                warn!(error = %err, "cleanup failed; continuing with remaining cleanups");
            }
        }
        count
    }

    /// Retire everything still registered. Used at engine teardown.
    pub fn retire_all(&mut self) {
        let ids: Vec<VariantId> = self.registrations.keys().cloned().collect();
        for id in ids {
            self.retire(&id);
        }
    }

    pub fn is_registered(&self, id: &VariantId) -> bool {
        self.registrations.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
