//! Ingest orchestration.
//!
//! Owns the scheduled pull loop, the shared per-event processing path used
//! by both polling and push ingestion, alert lifecycle operations, and the
//! health/metrics surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::domains::monitoring::errors::MonitorError;
use crate::domains::monitoring::models::{AlertStatus, CrisisAlert, MonitoringEvent, Severity};
use crate::domains::monitoring::rules::RuleEngine;
use crate::kernel::broadcast::{channels, MessageType};
use crate::kernel::deps::ServerDeps;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Fixed pull interval.
    pub poll_interval: Duration,
    /// Per-pull timeout; a timed-out pull abandons the cycle.
    pub pull_timeout: Duration,
    /// How far back similarity lookup reaches.
    pub dedup_window_hours: i64,
    /// Jaccard score above this marks a duplicate.
    pub dedup_threshold: f64,
    /// Per-source sentiment-confidence trust weights.
    pub source_trust: HashMap<String, f64>,
    pub default_source_trust: f64,
    /// Crisis-like visibility thresholds, independent of rule firing.
    pub crisis_reach: u64,
    pub crisis_sentiment: f64,
    /// Unhealthy after this many missed intervals.
    pub health_grace: u32,
    pub retention_days: i64,
    /// History considered when recomputing the volume baseline.
    pub baseline_lookback_hours: i64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(20),
            dedup_window_hours: 24,
            dedup_threshold: 0.85,
            source_trust: HashMap::new(),
            default_source_trust: 0.85,
            crisis_reach: 10_000,
            crisis_sentiment: -0.7,
            health_grace: 3,
            retention_days: 30,
            baseline_lookback_hours: 24,
        }
    }
}

impl MonitorConfig {
    fn trust_for(&self, source: &str) -> f64 {
        self.source_trust
            .get(source)
            .copied()
            .unwrap_or(self.default_source_trust)
    }
}

/// What one `process_events` call did, returned to push-path callers.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProcessOutcome {
    pub accepted: usize,
    pub filtered: usize,
    pub alerts: usize,
}

/// The crisis-monitoring pipeline.
pub struct CrisisMonitor {
    deps: ServerDeps,
    engine: RuleEngine,
    config: MonitorConfig,
    metrics: PipelineMetrics,
    running: AtomicBool,
    shutdown: StdMutex<Option<CancellationToken>>,
    started_at: StdMutex<Option<DateTime<Utc>>>,
    last_success: StdMutex<Option<DateTime<Utc>>>,
    last_pull: StdMutex<Option<DateTime<Utc>>>,
}

impl CrisisMonitor {
    pub fn new(deps: ServerDeps, engine: RuleEngine, config: MonitorConfig) -> Self {
        Self {
            deps,
            engine,
            config,
            metrics: PipelineMetrics::new(),
            running: AtomicBool::new(false),
            shutdown: StdMutex::new(None),
            started_at: StdMutex::new(None),
            last_success: StdMutex::new(None),
            last_pull: StdMutex::new(None),
        }
    }

    pub fn deps(&self) -> &ServerDeps {
        &self.deps
    }

    /// Start background ingestion. Idempotent.
    ///
    /// Probes every configured source once; fails only if *all* are
    /// unhealthy. Partial unhealthiness logs a warning and proceeds.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("monitor already running, start is a no-op");
            return Ok(());
        }

        if !self.deps.sources.is_empty() {
            let checks =
                futures::future::join_all(self.deps.sources.iter().map(|s| s.is_healthy())).await;
            let healthy = checks.iter().filter(|ok| **ok).count();
            for (source, ok) in self.deps.sources.iter().zip(&checks) {
                if !ok {
                    warn!(source = source.name(), "listening source unhealthy at startup");
                }
            }
            if healthy == 0 {
                self.running.store(false, Ordering::SeqCst);
                anyhow::bail!("all listening sources unhealthy, refusing to start");
            }
        } else {
            info!("no poll sources configured; push ingestion only");
        }

        let token = CancellationToken::new();
        *self.shutdown.lock().expect("shutdown lock poisoned") = Some(token.clone());
        *self.started_at.lock().expect("state lock poisoned") = Some(Utc::now());

        self.deps.store.spawn_flusher(token.child_token());
        self.deps.hub.spawn_heartbeat_sweeper(token.child_token());

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            // The first tick completes immediately: pull right away, then
            // on the fixed interval.
            let mut interval = tokio::time::interval(monitor.config.poll_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => monitor.poll_cycle().await,
                }
            }
            info!("ingest loop stopped");
        });

        info!(
            sources = self.deps.sources.len(),
            interval_secs = self.config.poll_interval.as_secs(),
            "crisis monitor started"
        );
        Ok(())
    }

    /// Stop background ingestion and flush buffered writes. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self
            .shutdown
            .lock()
            .expect("shutdown lock poisoned")
            .take()
        {
            token.cancel();
        }
        if let Err(e) = self.deps.store.flush().await {
            warn!(error = %e, "flush during shutdown failed; batch re-queued");
        }
        info!("crisis monitor stopped");
    }

    /// One scheduled pull across all sources. A source that fails or times
    /// out contributes nothing this cycle; if every source fails the cycle
    /// is abandoned with no partial commit.
    async fn poll_cycle(self: &Arc<Self>) {
        let since = *self.last_pull.lock().expect("state lock poisoned");
        let cycle_started = Utc::now();

        let mut fetched = Vec::new();
        let mut any_ok = self.deps.sources.is_empty();
        for source in &self.deps.sources {
            match tokio::time::timeout(self.config.pull_timeout, source.fetch_events(since)).await
            {
                Ok(Ok(events)) => {
                    debug!(source = source.name(), count = events.len(), "pulled events");
                    fetched.extend(events);
                    any_ok = true;
                }
                Ok(Err(e)) => {
                    let err = MonitorError::TransientIngestion {
                        origin: source.name().to_string(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "skipping source this cycle");
                }
                Err(_) => {
                    let err = MonitorError::TransientIngestion {
                        origin: source.name().to_string(),
                        reason: format!("timed out after {:?}", self.config.pull_timeout),
                    };
                    warn!(error = %err, "skipping source this cycle");
                }
            }
        }

        if !any_ok {
            warn!("every source failed; cycle abandoned");
            return;
        }

        match self.process_events(fetched).await {
            Ok(outcome) => {
                *self.last_pull.lock().expect("state lock poisoned") = Some(cycle_started);
                *self.last_success.lock().expect("state lock poisoned") = Some(Utc::now());
                debug!(
                    accepted = outcome.accepted,
                    filtered = outcome.filtered,
                    alerts = outcome.alerts,
                    "cycle complete"
                );
            }
            Err(e) => error!(error = %e, "cycle processing failed"),
        }

        let snapshot = self.get_metrics();
        self.deps
            .hub
            .publish(
                channels::METRICS,
                MessageType::Metric,
                serde_json::json!(snapshot),
            )
            .await;
    }

    /// Shared processing path for polled and pushed events.
    ///
    /// Events are handled in stable source order. Dedup consults state as
    /// of each event, so an in-batch duplicate of an earlier in-batch
    /// original is caught. Similarity-lookup failures fail open: the event
    /// is treated as unique rather than dropped.
    pub async fn process_events(
        &self,
        events: Vec<MonitoringEvent>,
    ) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let dedup_since = Utc::now() - chrono::Duration::hours(self.config.dedup_window_hours);

        let mut accepted: Vec<MonitoringEvent> = Vec::new();
        let mut filtered: u64 = 0;

        for mut event in events {
            let already_stored = match self.deps.store.contains(&event.id).await {
                Ok(known) => known,
                Err(e) => {
                    warn!(
                        error = %MonitorError::DuplicateDetection(e),
                        event = %event.id,
                        "id lookup failed; treating as new"
                    );
                    false
                }
            };
            if already_stored {
                filtered += 1;
                continue;
            }

            match self
                .deps
                .store
                .find_similar(&event, dedup_since, self.config.dedup_threshold)
                .await
            {
                Ok(matches) if !matches.is_empty() => {
                    let original = matches[0].id.clone();
                    event.mark_duplicate_of(&original);
                    debug!(event = %event.id, original = %original, "filtered duplicate");
                    filtered += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        error = %MonitorError::DuplicateDetection(e),
                        event = %event.id,
                        "similarity lookup failed; treating as unique"
                    );
                }
            }

            event
                .sentiment
                .weight_confidence(self.config.trust_for(&event.source_name));
            self.deps.store.batch_append(event.clone()).await;
            accepted.push(event);
        }

        let alerts = self.engine.evaluate(&accepted);
        for alert in &alerts {
            self.publish_alert(alert).await;
        }

        if !accepted.is_empty() {
            self.deps
                .hub
                .publish(
                    channels::EVENTS_ALL,
                    MessageType::Event,
                    serde_json::json!(accepted),
                )
                .await;

            let crisis_like: Vec<&MonitoringEvent> = accepted
                .iter()
                .filter(|e| e.is_crisis_like(self.config.crisis_reach, self.config.crisis_sentiment))
                .collect();
            if !crisis_like.is_empty() {
                self.deps
                    .hub
                    .publish(
                        channels::EVENTS_CRISIS,
                        MessageType::Event,
                        serde_json::json!(crisis_like),
                    )
                    .await;
            }
        }

        self.metrics
            .record_batch(&accepted, filtered, alerts.len() as u64, started.elapsed());

        Ok(ProcessOutcome {
            accepted: accepted.len(),
            filtered: filtered as usize,
            alerts: alerts.len(),
        })
    }

    /// Persist, notify, and broadcast one new alert. Broadcast happens only
    /// after the alert is durably stored; a persistence failure suppresses
    /// publication entirely.
    async fn publish_alert(&self, alert: &CrisisAlert) {
        if let Err(e) = self.deps.store.append_alert(alert).await {
            error!(alert_id = %alert.id, error = %e, "alert not persisted; publication suppressed");
            return;
        }

        if let Err(e) = self.deps.notifier.dispatch(alert).await {
            warn!(alert_id = %alert.id, error = %e, "notification dispatch failed");
        }

        let payload = serde_json::json!(alert);
        self.deps
            .hub
            .publish(channels::ALERTS_ALL, MessageType::Alert, payload.clone())
            .await;
        if alert.severity == Severity::Critical {
            self.deps
                .hub
                .publish(channels::ALERTS_CRITICAL, MessageType::Alert, payload)
                .await;
        }

        info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            alert_type = %alert.alert_type,
            "alert raised"
        );
    }

    pub async fn acknowledge_alert(
        &self,
        id: Uuid,
        actor: &str,
    ) -> Result<CrisisAlert, MonitorError> {
        self.transition_and_publish(id, AlertStatus::Acknowledged, actor)
            .await
    }

    pub async fn resolve_alert(&self, id: Uuid, actor: &str) -> Result<CrisisAlert, MonitorError> {
        self.transition_and_publish(id, AlertStatus::Resolved, actor)
            .await
    }

    async fn transition_and_publish(
        &self,
        id: Uuid,
        to: AlertStatus,
        actor: &str,
    ) -> Result<CrisisAlert, MonitorError> {
        let alert = self.deps.store.transition_alert(id, to, actor).await?;

        let payload = serde_json::json!(alert);
        self.deps
            .hub
            .publish(channels::ALERTS_ALL, MessageType::AlertUpdate, payload.clone())
            .await;
        if alert.severity == Severity::Critical {
            self.deps
                .hub
                .publish(channels::ALERTS_CRITICAL, MessageType::AlertUpdate, payload)
                .await;
        }
        Ok(alert)
    }

    pub async fn recent_events(
        &self,
        limit: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<MonitoringEvent>> {
        self.deps.store.query(since, limit).await
    }

    pub async fn active_alerts(&self) -> Result<Vec<CrisisAlert>> {
        self.deps.store.active_alerts().await
    }

    /// Healthy while the ingest loop keeps completing within a grace
    /// multiple of its interval.
    pub fn is_healthy(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let grace = chrono::Duration::from_std(self.config.poll_interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(30))
            * self.config.health_grace as i32;
        let now = Utc::now();
        match *self.last_success.lock().expect("state lock poisoned") {
            Some(at) => now - at < grace,
            // Not a single cycle yet: give the loop one grace window after
            // start before reporting unhealthy.
            None => self
                .started_at
                .lock()
                .expect("state lock poisoned")
                .map(|at| now - at < grace)
                .unwrap_or(false),
        }
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics
            .snapshot(self.deps.store.persistence_failures())
    }

    /// Recompute the rolling volume baseline from history older than the
    /// current window. Called on a schedule, not per batch.
    pub async fn recompute_baseline(&self) -> Result<f64> {
        let window_minutes = self.engine.window_minutes();
        let now = Utc::now();
        let to = now - chrono::Duration::minutes(window_minutes);
        let from = now - chrono::Duration::hours(self.config.baseline_lookback_hours);
        if to <= from {
            return Ok(self.engine_baseline_update(0.0));
        }

        let count = self.deps.store.count_events_between(from, to).await?;
        let span_minutes = (to - from).num_minutes().max(1);
        let windows = (span_minutes as f64 / window_minutes as f64).max(1.0);
        let per_window = count as f64 / windows;
        Ok(self.engine_baseline_update(per_window))
    }

    fn engine_baseline_update(&self, per_window: f64) -> f64 {
        self.engine.update_baseline(per_window);
        debug!(per_window, "volume baseline recomputed");
        per_window
    }

    /// Purge events past the retention horizon.
    pub async fn run_retention_sweep(&self) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::days(self.config.retention_days);
        let purged = self.deps.store.delete_events_before(cutoff).await?;
        if purged > 0 {
            info!(purged, "retention sweep removed expired events");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domains::monitoring::models::{EventType, Sentiment, SentimentLabel};
    use crate::domains::monitoring::rules::{default_rules, RuleThresholds, VolumeBaseline};
    use crate::kernel::test_dependencies::TestDependencies;

    fn monitor() -> (TestDependencies, Arc<CrisisMonitor>) {
        let test_deps = TestDependencies::new();
        let baseline = VolumeBaseline::new();
        let engine = RuleEngine::new(
            default_rules(&RuleThresholds::default(), baseline.clone()),
            baseline,
        );
        let monitor = Arc::new(CrisisMonitor::new(
            test_deps.deps.clone(),
            engine,
            MonitorConfig::default(),
        ));
        (test_deps, monitor)
    }

    fn event(id: &str, title: &str, body: &str) -> MonitoringEvent {
        MonitoringEvent::builder()
            .id(id)
            .source_name("testwire")
            .event_type(EventType::Social)
            .occurred_at(Utc::now())
            .title(title)
            .body(body)
            .platform("twitter")
            .build()
    }

    #[tokio::test]
    async fn accepts_and_stores_new_events() {
        let (test_deps, monitor) = monitor();
        let outcome = monitor
            .process_events(vec![event("s:1", "rally downtown", "big crowd tonight")])
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.filtered, 0);
        assert!(test_deps.deps.store.contains("s:1").await.unwrap());
    }

    #[tokio::test]
    async fn in_batch_duplicate_is_caught() {
        let (_test_deps, monitor) = monitor();
        let outcome = monitor
            .process_events(vec![
                event("s:1", "candidate denies claims", "full statement text"),
                event("s:2", "candidate denies claims", "full statement text"),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.filtered, 1);
    }

    #[tokio::test]
    async fn similarity_failure_fails_open() {
        let (test_deps, monitor) = monitor();
        test_deps.backend.fail_queries(true);

        let outcome = monitor
            .process_events(vec![event("s:1", "rally downtown", "big crowd tonight")])
            .await
            .unwrap();
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.filtered, 0);
    }

    #[tokio::test]
    async fn trust_weight_scales_confidence() {
        let (test_deps, monitor) = monitor();
        let mut e = event("s:1", "rally downtown", "big crowd tonight");
        e.sentiment = Sentiment::new(0.4, SentimentLabel::Positive, 1.0);
        monitor.process_events(vec![e]).await.unwrap();

        test_deps.deps.store.flush().await.unwrap();
        let stored = test_deps.deps.store.query(None, 1).await.unwrap();
        assert!((stored[0].sentiment.confidence - 0.85).abs() < 1e-9);
        assert_eq!(stored[0].sentiment.score, 0.4);
    }

    #[tokio::test]
    async fn start_fails_when_all_sources_unhealthy() {
        let (test_deps, monitor) = monitor();
        test_deps.source.set_healthy(false);
        assert!(monitor.start().await.is_err());
        assert!(!monitor.is_healthy());
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (_test_deps, monitor) = monitor();
        monitor.start().await.unwrap();
        monitor.start().await.unwrap();
        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_healthy());
    }

    #[tokio::test]
    async fn crisis_like_events_reach_the_crisis_channel() {
        let (test_deps, monitor) = monitor();
        let mut crisis_rx = test_deps
            .deps
            .hub
            .connect_with(&[channels::EVENTS_CRISIS])
            .await;

        let mut viral = event("s:1", "scandal coverage", "front page everywhere");
        viral.metrics.reach = 50_000;
        monitor.process_events(vec![viral]).await.unwrap();

        let msg = crisis_rx.receiver.recv().await.unwrap();
        assert_eq!(msg.channel, "events.crisis");
    }

    #[tokio::test]
    async fn quiet_events_stay_off_the_crisis_channel() {
        let (test_deps, monitor) = monitor();
        let mut crisis_rx = test_deps
            .deps
            .hub
            .connect_with(&[channels::EVENTS_CRISIS])
            .await;

        monitor
            .process_events(vec![event("s:1", "minor mention", "nothing notable")])
            .await
            .unwrap();
        assert!(crisis_rx.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn acknowledgement_publishes_an_update() {
        let (test_deps, monitor) = monitor();
        let mut rx = test_deps.deps.hub.connect().await;

        let mut viral = event("s:1", "scandal coverage", "front page everywhere");
        viral.metrics.reach = 50_000;
        viral.sentiment = Sentiment::new(-0.9, SentimentLabel::Negative, 0.9);
        monitor.process_events(vec![viral]).await.unwrap();

        // first message: the alert itself
        let alert_msg = rx.receiver.recv().await.unwrap();
        assert_eq!(alert_msg.message_type, MessageType::Alert);
        let alert_id: Uuid =
            serde_json::from_value(alert_msg.data["id"].clone()).unwrap();

        monitor.acknowledge_alert(alert_id, "oncall").await.unwrap();

        // events.all batch then the update (order: alert, events, update)
        let mut saw_update = false;
        while let Ok(msg) = rx.receiver.try_recv() {
            if msg.message_type == MessageType::AlertUpdate {
                assert_eq!(msg.data["status"], "acknowledged");
                saw_update = true;
            }
        }
        assert!(saw_update);
    }

    #[tokio::test]
    async fn notification_failure_does_not_block_the_alert() {
        let (test_deps, monitor) = monitor();
        test_deps.notifier.set_failing(true);

        let mut viral = event("s:1", "scandal coverage", "front page everywhere");
        viral.metrics.reach = 50_000;
        viral.sentiment = Sentiment::new(-0.9, SentimentLabel::Negative, 0.9);
        let outcome = monitor.process_events(vec![viral]).await.unwrap();

        assert_eq!(outcome.alerts, 1);
        assert_eq!(test_deps.deps.store.active_alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retention_sweep_uses_configured_horizon() {
        let (_test_deps, monitor) = monitor();
        let mut old = event("s:1", "ancient mention", "forgotten words");
        old.occurred_at = Utc::now() - chrono::Duration::days(45);
        monitor.process_events(vec![old]).await.unwrap();

        assert_eq!(monitor.run_retention_sweep().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn baseline_recompute_uses_older_history() {
        let (_test_deps, monitor) = monitor();
        let mut older = event("s:1", "steady mention", "routine coverage words");
        older.occurred_at = Utc::now() - chrono::Duration::hours(3);
        monitor.process_events(vec![older]).await.unwrap();
        monitor.deps.store.flush().await.unwrap();

        let per_window = monitor.recompute_baseline().await.unwrap();
        assert!(per_window > 0.0);
    }
}
