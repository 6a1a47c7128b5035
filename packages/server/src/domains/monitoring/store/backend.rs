//! Storage boundary for the event store.
//!
//! The backend exposes insert/query/update primitives only; idempotence,
//! similarity ranking, batching, and lifecycle enforcement live in
//! [`super::EventStore`]. Production runs on Postgres, tests on the
//! in-memory backend.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domains::monitoring::models::{AlertStatus, CrisisAlert, MonitoringEvent};

#[async_trait]
pub trait BaseEventStorage: Send + Sync {
    /// Insert events, ignoring ids that already exist. Returns the number of
    /// rows actually written.
    async fn insert_events(&self, events: &[MonitoringEvent]) -> Result<u64>;

    async fn contains_event(&self, id: &str) -> Result<bool>;

    /// Events on one platform with `occurred_at >= since`, for similarity
    /// candidate lookup.
    async fn events_by_platform_since(
        &self,
        platform: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MonitoringEvent>>;

    /// Events ordered by `occurred_at` descending, optionally bounded below.
    async fn events_since(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<MonitoringEvent>>;

    async fn count_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    /// Retention sweep primitive. Returns the number of purged events.
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn insert_alert(&self, alert: &CrisisAlert) -> Result<()>;

    async fn alert_by_id(&self, id: Uuid) -> Result<Option<CrisisAlert>>;

    async fn alerts_by_status(&self, status: AlertStatus) -> Result<Vec<CrisisAlert>>;

    async fn update_alert(&self, alert: &CrisisAlert) -> Result<()>;
}
