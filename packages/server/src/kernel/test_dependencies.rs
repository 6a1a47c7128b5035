//! Test doubles for external services.
//!
//! Available outside `cfg(test)` so integration tests under `tests/` can
//! use them too.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domains::monitoring::models::{CrisisAlert, MonitoringEvent};
use crate::domains::monitoring::store::{EventStore, MemoryEventStorage};
use crate::kernel::broadcast::BroadcastHub;
use crate::kernel::deps::ServerDeps;
use crate::kernel::traits::{
    BaseListeningSource, BaseNotificationDispatcher, SourceHealth,
};

/// Scripted listening source: batches are queued by the test and popped one
/// per fetch.
pub struct TestListeningSource {
    name: String,
    batches: Mutex<VecDeque<Vec<MonitoringEvent>>>,
    healthy: AtomicBool,
}

impl TestListeningSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            batches: Mutex::new(VecDeque::new()),
            healthy: AtomicBool::new(true),
        }
    }

    pub async fn push_batch(&self, events: Vec<MonitoringEvent>) {
        self.batches.lock().await.push_back(events);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl BaseListeningSource for TestListeningSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_events(&self, _since: Option<DateTime<Utc>>) -> Result<Vec<MonitoringEvent>> {
        if !self.healthy.load(Ordering::SeqCst) {
            anyhow::bail!("source '{}' is down", self.name);
        }
        Ok(self.batches.lock().await.pop_front().unwrap_or_default())
    }

    async fn health_check(&self) -> SourceHealth {
        if self.healthy.load(Ordering::SeqCst) {
            SourceHealth::healthy()
        } else {
            SourceHealth::unhealthy("connection refused")
        }
    }
}

/// Records every dispatched alert; optionally fails to exercise the
/// log-and-continue path.
#[derive(Default)]
pub struct TestNotifier {
    dispatched: Mutex<Vec<CrisisAlert>>,
    fail: AtomicBool,
}

impl TestNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub async fn dispatched(&self) -> Vec<CrisisAlert> {
        self.dispatched.lock().await.clone()
    }
}

#[async_trait]
impl BaseNotificationDispatcher for TestNotifier {
    async fn dispatch(&self, alert: &CrisisAlert) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("notification channel unavailable");
        }
        self.dispatched.lock().await.push(alert.clone());
        Ok(())
    }
}

/// Fully wired in-memory dependency set.
pub struct TestDependencies {
    pub deps: ServerDeps,
    pub backend: Arc<MemoryEventStorage>,
    pub source: Arc<TestListeningSource>,
    pub notifier: Arc<TestNotifier>,
}

impl TestDependencies {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryEventStorage::new());
        let store = Arc::new(EventStore::new(backend.clone()));
        let hub = BroadcastHub::new();
        let source = Arc::new(TestListeningSource::new("testwire"));
        let notifier = Arc::new(TestNotifier::new());

        let deps = ServerDeps::new(
            store,
            hub,
            vec![source.clone() as Arc<dyn BaseListeningSource>],
            notifier.clone() as Arc<dyn BaseNotificationDispatcher>,
        );

        Self {
            deps,
            backend,
            source,
            notifier,
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
