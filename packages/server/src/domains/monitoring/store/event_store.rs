//! Durable log of events and alerts.
//!
//! Wraps a [`BaseEventStorage`] backend with the pipeline-facing guarantees:
//! idempotent appends, content-similarity lookup, write batching with a
//! bounded flush latency, and alert lifecycle enforcement.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::backend::BaseEventStorage;
use super::similarity::{rank_similar, SimilarityMatch};
use crate::domains::monitoring::errors::MonitorError;
use crate::domains::monitoring::models::{AlertStatus, CrisisAlert, MonitoringEvent};

/// Tunables for write batching.
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    /// Flush once this many events are buffered.
    pub batch_size: usize,
    /// Flush at least this often regardless of batch size, bounding
    /// worst-case write latency.
    pub flush_interval: Duration,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct WriteBuffer {
    events: Vec<MonitoringEvent>,
    ids: HashSet<String>,
}

/// Event store over a pluggable storage backend.
pub struct EventStore {
    backend: Arc<dyn BaseEventStorage>,
    config: EventStoreConfig,
    buffer: Mutex<WriteBuffer>,
    /// Content hash -> (event id, occurred_at) for the exact-duplicate fast
    /// path. Covers buffered and recently flushed events; pruned by the
    /// retention sweep.
    recent_hashes: StdMutex<HashMap<String, (String, DateTime<Utc>)>>,
    persistence_failures: AtomicU64,
}

impl EventStore {
    pub fn new(backend: Arc<dyn BaseEventStorage>) -> Self {
        Self::with_config(backend, EventStoreConfig::default())
    }

    pub fn with_config(backend: Arc<dyn BaseEventStorage>, config: EventStoreConfig) -> Self {
        Self {
            backend,
            config,
            buffer: Mutex::new(WriteBuffer::default()),
            recent_hashes: StdMutex::new(HashMap::new()),
            persistence_failures: AtomicU64::new(0),
        }
    }

    /// Flush failures that exhausted their retry, for the metrics snapshot.
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::SeqCst)
    }

    /// Whether an event id is already known, counting buffered writes so a
    /// duplicate arriving in the same batch as its original is still caught.
    pub async fn contains(&self, id: &str) -> Result<bool> {
        if self.buffer.lock().await.ids.contains(id) {
            return Ok(true);
        }
        self.backend.contains_event(id).await
    }

    /// Append a single event immediately. Idempotent: re-appending an
    /// already-stored id is a no-op and returns `false`.
    pub async fn append(&self, event: &MonitoringEvent) -> Result<bool> {
        if self.contains(&event.id).await? {
            return Ok(false);
        }
        let written = self.insert_with_retry(std::slice::from_ref(event)).await?;
        self.remember_hash(event);
        Ok(written > 0)
    }

    /// Buffer an event for the next flush. The buffer flushes when it
    /// reaches `batch_size`; the background flusher covers the time bound.
    pub async fn batch_append(&self, event: MonitoringEvent) {
        let ready = {
            let mut buffer = self.buffer.lock().await;
            if !buffer.ids.insert(event.id.clone()) {
                return;
            }
            self.remember_hash(&event);
            buffer.events.push(event);
            buffer.events.len() >= self.config.batch_size
        };

        if ready {
            if let Err(e) = self.flush().await {
                warn!(error = %e, "size-triggered flush failed; batch re-queued");
            }
        }
    }

    /// Write all buffered events to the backend.
    ///
    /// A failed write is retried once; if the retry also fails the batch is
    /// re-queued (never dropped) and the failure counter is bumped.
    pub async fn flush(&self) -> Result<u64> {
        let batch = {
            let mut buffer = self.buffer.lock().await;
            if buffer.events.is_empty() {
                return Ok(0);
            }
            std::mem::take(&mut buffer.events)
        };

        match self.insert_with_retry(&batch).await {
            Ok(written) => {
                let mut buffer = self.buffer.lock().await;
                for event in &batch {
                    buffer.ids.remove(&event.id);
                }
                debug!(count = batch.len(), written, "flushed event batch");
                Ok(written)
            }
            Err(e) => {
                self.persistence_failures.fetch_add(1, Ordering::SeqCst);
                let mut buffer = self.buffer.lock().await;
                // Keep stable source order: the failed batch precedes
                // anything buffered while the flush was in flight.
                let newer = std::mem::take(&mut buffer.events);
                buffer.events = batch;
                buffer.events.extend(newer);
                Err(MonitorError::Persistence(e).into())
            }
        }
    }

    async fn insert_with_retry(&self, events: &[MonitoringEvent]) -> Result<u64> {
        match self.backend.insert_events(events).await {
            Ok(written) => Ok(written),
            Err(first) => {
                warn!(error = %first, count = events.len(), "event insert failed, retrying once");
                self.backend.insert_events(events).await
            }
        }
    }

    /// Spawn the interval flusher. Runs until `shutdown` is cancelled, then
    /// performs a final flush.
    pub fn spawn_flusher(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(store.config.flush_interval);
            interval.tick().await; // first tick fires immediately

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = store.flush().await {
                            warn!(error = %e, "interval flush failed; batch re-queued");
                        }
                    }
                }
            }

            if let Err(e) = store.flush().await {
                error!(error = %e, "final flush on shutdown failed");
            }
        })
    }

    /// Ranked similar events on the same platform with
    /// `occurred_at >= since` and Jaccard score above `threshold`.
    /// Empty on no match; an `Err` means the lookup itself failed (the
    /// caller decides whether to fail open).
    pub async fn find_similar(
        &self,
        event: &MonitoringEvent,
        since: DateTime<Utc>,
        threshold: f64,
    ) -> Result<Vec<SimilarityMatch>> {
        // Exact-content fast path: an identical normalized text within the
        // window is a Jaccard score of 1.0 without any scoring.
        if let Some((id, seen_at)) = self
            .recent_hashes
            .lock()
            .expect("hash index lock poisoned")
            .get(&event.content_hash())
            .cloned()
        {
            if id != event.id && seen_at >= since {
                return Ok(vec![SimilarityMatch { id, score: 1.0 }]);
            }
        }

        let mut candidates: Vec<MonitoringEvent> = {
            let buffer = self.buffer.lock().await;
            buffer
                .events
                .iter()
                .filter(|e| e.platform == event.platform && e.occurred_at >= since)
                .cloned()
                .collect()
        };
        candidates.extend(
            self.backend
                .events_by_platform_since(&event.platform, since)
                .await?,
        );

        Ok(rank_similar(event, &candidates, threshold))
    }

    /// Events ordered by `occurred_at` descending. Buffered writes are
    /// flushed first so readers see a consistent log.
    pub async fn query(
        &self,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<MonitoringEvent>> {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "flush before query failed; results may lag");
        }
        self.backend.events_since(since, limit).await
    }

    pub async fn count_events_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        self.backend.count_events_between(from, to).await
    }

    /// Retention sweep: purge events older than `cutoff` and prune the hash
    /// index accordingly.
    pub async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        if let Err(e) = self.flush().await {
            warn!(error = %e, "flush before retention sweep failed");
        }
        let purged = self.backend.delete_events_before(cutoff).await?;
        self.recent_hashes
            .lock()
            .expect("hash index lock poisoned")
            .retain(|_, (_, seen_at)| *seen_at >= cutoff);
        Ok(purged)
    }

    /// Persist an alert durably. Alerts are never batched: publishing
    /// happens only after this returns, so the write must be immediate.
    pub async fn append_alert(&self, alert: &CrisisAlert) -> Result<()> {
        match self.backend.insert_alert(alert).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(alert_id = %alert.id, error = %first, "alert insert failed, retrying once");
                match self.backend.insert_alert(alert).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.persistence_failures.fetch_add(1, Ordering::SeqCst);
                        Err(MonitorError::Persistence(e).into())
                    }
                }
            }
        }
    }

    /// Alerts that still need operator attention (active or acknowledged),
    /// newest first.
    pub async fn active_alerts(&self) -> Result<Vec<CrisisAlert>> {
        let mut alerts = self.backend.alerts_by_status(AlertStatus::Active).await?;
        alerts.extend(
            self.backend
                .alerts_by_status(AlertStatus::Acknowledged)
                .await?,
        );
        alerts.sort_by_key(|a| std::cmp::Reverse(a.created_at));
        Ok(alerts)
    }

    pub async fn alert(&self, id: Uuid) -> Result<Option<CrisisAlert>> {
        self.backend.alert_by_id(id).await
    }

    /// Apply a lifecycle transition. Illegal transitions are rejected with
    /// the stored state unchanged.
    pub async fn transition_alert(
        &self,
        id: Uuid,
        to: AlertStatus,
        actor: &str,
    ) -> Result<CrisisAlert, MonitorError> {
        let mut alert = self
            .backend
            .alert_by_id(id)
            .await
            .map_err(MonitorError::Persistence)?
            .ok_or(MonitorError::AlertNotFound { id })?;

        alert.transition(to, actor)?;

        self.backend
            .update_alert(&alert)
            .await
            .map_err(MonitorError::Persistence)?;
        Ok(alert)
    }

    fn remember_hash(&self, event: &MonitoringEvent) {
        self.recent_hashes
            .lock()
            .expect("hash index lock poisoned")
            .insert(event.content_hash(), (event.id.clone(), event.occurred_at));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::domains::monitoring::models::{AlertType, EventType, Severity};
    use crate::domains::monitoring::store::testing::MemoryEventStorage;

    fn event(id: &str, title: &str, body: &str) -> MonitoringEvent {
        MonitoringEvent::builder()
            .id(id)
            .source_name("brandwire")
            .event_type(EventType::Social)
            .occurred_at(Utc::now())
            .title(title)
            .body(body)
            .platform("twitter")
            .build()
    }

    fn store_with(batch_size: usize) -> (Arc<MemoryEventStorage>, EventStore) {
        let backend = Arc::new(MemoryEventStorage::new());
        let store = EventStore::with_config(
            backend.clone(),
            EventStoreConfig {
                batch_size,
                flush_interval: Duration::from_secs(5),
            },
        );
        (backend, store)
    }

    fn alert() -> CrisisAlert {
        CrisisAlert::builder()
            .severity(Severity::High)
            .alert_type(AlertType::SentimentDrop)
            .title("Sentiment drop")
            .description("weighted mean below threshold")
            .build()
            .finalize()
    }

    #[tokio::test]
    async fn append_is_idempotent() {
        let (backend, store) = store_with(50);
        let e = event("s:1", "rally tonight", "crowd expected");

        assert!(store.append(&e).await.unwrap());
        assert!(!store.append(&e).await.unwrap());
        assert_eq!(backend.event_count().await, 1);
    }

    #[tokio::test]
    async fn batch_flushes_at_size_threshold() {
        let (backend, store) = store_with(3);

        store.batch_append(event("s:1", "one", "alpha")).await;
        store.batch_append(event("s:2", "two", "beta")).await;
        assert_eq!(backend.event_count().await, 0);

        store.batch_append(event("s:3", "three", "gamma")).await;
        assert_eq!(backend.event_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn flusher_covers_the_time_bound() {
        let (backend, store) = store_with(50);
        let store = Arc::new(store);
        let shutdown = CancellationToken::new();
        let handle = store.spawn_flusher(shutdown.clone());

        store.batch_append(event("s:1", "one", "alpha")).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(backend.event_count().await, 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failed_flush_requeues_and_counts() {
        let (backend, store) = store_with(50);
        backend.fail_inserts(true);

        store.batch_append(event("s:1", "one", "alpha")).await;
        assert!(store.flush().await.is_err());
        // initial attempt + one retry
        assert_eq!(backend.insert_calls(), 2);
        assert_eq!(store.persistence_failures(), 1);
        assert_eq!(backend.event_count().await, 0);

        backend.fail_inserts(false);
        assert_eq!(store.flush().await.unwrap(), 1);
        assert_eq!(backend.event_count().await, 1);
    }

    #[tokio::test]
    async fn contains_sees_buffered_events() {
        let (_backend, store) = store_with(50);
        store.batch_append(event("s:1", "one", "alpha")).await;
        assert!(store.contains("s:1").await.unwrap());
        assert!(!store.contains("s:2").await.unwrap());
    }

    #[tokio::test]
    async fn find_similar_matches_exact_content_via_hash() {
        let (_backend, store) = store_with(50);
        store
            .batch_append(event("s:1", "Candidate denies claims", "full statement text"))
            .await;

        let incoming = event("other:9", "candidate DENIES claims!", "full statement text");
        let since = Utc::now() - ChronoDuration::hours(24);
        let matches = store.find_similar(&incoming, since, 0.85).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "s:1");
        assert!((matches[0].score - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn find_similar_is_platform_scoped() {
        let (_backend, store) = store_with(50);
        let mut original = event("s:1", "candidate denies claims", "full statement text");
        original.platform = "facebook".to_string();
        store.append(&original).await.unwrap();

        // Same words, different platform: the hash fast path would match, so
        // vary the text and rely on Jaccard.
        let incoming = event("s:2", "candidate denies claims", "full statement text today");
        let since = Utc::now() - ChronoDuration::hours(24);
        assert!(store.find_similar(&incoming, since, 0.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_similar_respects_since_bound() {
        let (_backend, store) = store_with(50);
        let mut old = event("s:1", "candidate denies claims", "full statement text");
        old.occurred_at = Utc::now() - ChronoDuration::hours(48);
        store.append(&old).await.unwrap();

        let incoming = event("s:2", "candidate denies claims", "full statement text");
        let since = Utc::now() - ChronoDuration::hours(24);
        assert!(store.find_similar(&incoming, since, 0.5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_similar_propagates_lookup_failure() {
        let (backend, store) = store_with(50);
        backend.fail_queries(true);

        let incoming = event("s:1", "rally tonight", "crowd expected");
        let since = Utc::now() - ChronoDuration::hours(24);
        assert!(store.find_similar(&incoming, since, 0.85).await.is_err());
    }

    #[tokio::test]
    async fn query_returns_newest_first() {
        let (_backend, store) = store_with(50);
        let mut first = event("s:1", "first post", "alpha words here");
        first.occurred_at = Utc::now() - ChronoDuration::minutes(10);
        let second = event("s:2", "second post", "beta words here");

        store.batch_append(first).await;
        store.batch_append(second).await;

        let events = store.query(None, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "s:2");
        assert_eq!(events[1].id, "s:1");
    }

    #[tokio::test]
    async fn transition_enforces_lifecycle() {
        let (_backend, store) = store_with(50);
        let a = alert();
        store.append_alert(&a).await.unwrap();

        let updated = store
            .transition_alert(a.id, AlertStatus::Acknowledged, "ana")
            .await
            .unwrap();
        assert_eq!(updated.status, AlertStatus::Acknowledged);

        store
            .transition_alert(a.id, AlertStatus::Resolved, "ana")
            .await
            .unwrap();

        let err = store
            .transition_alert(a.id, AlertStatus::Active, "ana")
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidTransition { .. }));

        // stored state unchanged by the rejected transition
        let stored = store.alert(a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Resolved);
    }

    #[tokio::test]
    async fn transition_of_unknown_alert_fails() {
        let (_backend, store) = store_with(50);
        let err = store
            .transition_alert(Uuid::new_v4(), AlertStatus::Resolved, "ana")
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::AlertNotFound { .. }));
    }

    #[tokio::test]
    async fn active_alerts_include_acknowledged() {
        let (_backend, store) = store_with(50);
        let a = alert();
        let b = alert();
        store.append_alert(&a).await.unwrap();
        store.append_alert(&b).await.unwrap();
        store
            .transition_alert(a.id, AlertStatus::Acknowledged, "ana")
            .await
            .unwrap();

        assert_eq!(store.active_alerts().await.unwrap().len(), 2);

        store
            .transition_alert(b.id, AlertStatus::Resolved, "ana")
            .await
            .unwrap();
        assert_eq!(store.active_alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retention_sweep_purges_old_events() {
        let (backend, store) = store_with(50);
        let mut old = event("s:1", "old mention", "stale words");
        old.occurred_at = Utc::now() - ChronoDuration::days(60);
        store.append(&old).await.unwrap();
        store.append(&event("s:2", "new mention", "fresh words")).await.unwrap();

        let purged = store
            .delete_events_before(Utc::now() - ChronoDuration::days(30))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(backend.event_count().await, 1);
    }
}
