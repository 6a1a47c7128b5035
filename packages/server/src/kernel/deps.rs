//! Server dependencies (using traits for testability)
//!
//! Central dependency container handed to the orchestrator and HTTP layer.
//! External services sit behind trait abstractions so tests can inject
//! doubles.

use std::sync::Arc;

use crate::domains::monitoring::store::EventStore;
use crate::kernel::broadcast::BroadcastHub;
use crate::kernel::traits::{BaseListeningSource, BaseNotificationDispatcher};

#[derive(Clone)]
pub struct ServerDeps {
    /// Durable event/alert log with dedup lookup.
    pub store: Arc<EventStore>,
    /// Live fan-out to dashboard subscribers.
    pub hub: BroadcastHub,
    /// Upstream listening services polled by the ingest loop.
    pub sources: Vec<Arc<dyn BaseListeningSource>>,
    /// Outbound alert notifications.
    pub notifier: Arc<dyn BaseNotificationDispatcher>,
}

impl ServerDeps {
    pub fn new(
        store: Arc<EventStore>,
        hub: BroadcastHub,
        sources: Vec<Arc<dyn BaseListeningSource>>,
        notifier: Arc<dyn BaseNotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            hub,
            sources,
            notifier,
        }
    }
}
