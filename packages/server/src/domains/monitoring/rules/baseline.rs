//! Rolling volume baseline.

use std::sync::{Arc, RwLock};

/// Average events-per-window, recomputed periodically from history older
/// than the current window. Shared between the engine (writer) and the
/// volume predicate (reader); defaults to 0 so the configured floor alone
/// governs until the first recompute.
#[derive(Clone, Default)]
pub struct VolumeBaseline {
    inner: Arc<RwLock<f64>>,
}

impl VolumeBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_per_window(&self) -> f64 {
        *self.inner.read().expect("baseline lock poisoned")
    }

    pub fn update(&self, events_per_window: f64) {
        *self.inner.write().expect("baseline lock poisoned") = events_per_window.max(0.0);
    }
}
