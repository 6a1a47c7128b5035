//! In-memory storage backend for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::backend::BaseEventStorage;
use crate::domains::monitoring::models::{AlertStatus, CrisisAlert, MonitoringEvent};

/// Backend keeping everything in maps. Supports fault injection so store
/// retry/requeue behavior can be exercised without a database.
#[derive(Default)]
pub struct MemoryEventStorage {
    events: Mutex<HashMap<String, MonitoringEvent>>,
    alerts: Mutex<HashMap<Uuid, CrisisAlert>>,
    fail_inserts: AtomicBool,
    fail_queries: AtomicBool,
    insert_calls: AtomicU64,
}

impl MemoryEventStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `insert_events` call fail until cleared.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every query primitive fail until cleared.
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of `insert_events` calls seen, including failed ones.
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub async fn event_count(&self) -> usize {
        self.events.lock().await.len()
    }

    fn check_query_fault(&self) -> Result<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            anyhow::bail!("injected query failure");
        }
        Ok(())
    }
}

#[async_trait]
impl BaseEventStorage for MemoryEventStorage {
    async fn insert_events(&self, events: &[MonitoringEvent]) -> Result<u64> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            anyhow::bail!("injected insert failure");
        }

        let mut stored = self.events.lock().await;
        let mut written = 0;
        for event in events {
            if !stored.contains_key(&event.id) {
                stored.insert(event.id.clone(), event.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn contains_event(&self, id: &str) -> Result<bool> {
        self.check_query_fault()?;
        Ok(self.events.lock().await.contains_key(id))
    }

    async fn events_by_platform_since(
        &self,
        platform: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MonitoringEvent>> {
        self.check_query_fault()?;
        Ok(self
            .events
            .lock()
            .await
            .values()
            .filter(|e| e.platform == platform && e.occurred_at >= since)
            .cloned()
            .collect())
    }

    async fn events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<MonitoringEvent>> {
        self.check_query_fault()?;
        let mut events: Vec<MonitoringEvent> = self
            .events
            .lock()
            .await
            .values()
            .filter(|e| since.map(|s| e.occurred_at >= s).unwrap_or(true))
            .cloned()
            .collect();
        events.sort_by_key(|e| std::cmp::Reverse(e.occurred_at));
        events.truncate(limit.max(0) as usize);
        Ok(events)
    }

    async fn count_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        self.check_query_fault()?;
        Ok(self
            .events
            .lock()
            .await
            .values()
            .filter(|e| e.occurred_at >= from && e.occurred_at < to)
            .count() as i64)
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|_, e| e.occurred_at >= cutoff);
        Ok((before - events.len()) as u64)
    }

    async fn insert_alert(&self, alert: &CrisisAlert) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            anyhow::bail!("injected insert failure");
        }
        self.alerts.lock().await.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn alert_by_id(&self, id: Uuid) -> Result<Option<CrisisAlert>> {
        self.check_query_fault()?;
        Ok(self.alerts.lock().await.get(&id).cloned())
    }

    async fn alerts_by_status(&self, status: AlertStatus) -> Result<Vec<CrisisAlert>> {
        self.check_query_fault()?;
        let mut alerts: Vec<CrisisAlert> = self
            .alerts
            .lock()
            .await
            .values()
            .filter(|a| a.status == status)
            .cloned()
            .collect();
        alerts.sort_by_key(|a| std::cmp::Reverse(a.created_at));
        Ok(alerts)
    }

    async fn update_alert(&self, alert: &CrisisAlert) -> Result<()> {
        let mut alerts = self.alerts.lock().await;
        if !alerts.contains_key(&alert.id) {
            anyhow::bail!("alert {} does not exist", alert.id);
        }
        alerts.insert(alert.id, alert.clone());
        Ok(())
    }
}
