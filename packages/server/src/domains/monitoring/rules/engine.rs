//! Sliding-window rule evaluation.
//!
//! Turns a batch of newly accepted events into zero or more alerts. Windows
//! are derived from event timestamps, not wall-clock, so back-filled batches
//! are analyzed correctly.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::baseline::VolumeBaseline;
use super::predicates::weighted_mean_sentiment;
use crate::domains::monitoring::models::{
    AlertRule, CrisisAlert, Firing, MonitoringEvent, Severity,
};

#[derive(Debug, Clone)]
pub struct RuleEngineConfig {
    /// Fixed window length.
    pub window_minutes: i64,
    /// Fixed step between window starts; smaller than the length, so
    /// windows overlap.
    pub step_minutes: i64,
    /// How many representative events an alert references.
    pub max_trigger_events: usize,
}

impl Default for RuleEngineConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            step_minutes: 30,
            max_trigger_events: 5,
        }
    }
}

/// Evaluates an ordered rule list over sliding windows, enforcing per-rule
/// cooldowns. The cooldown map is the engine's only mutable state and is
/// serialized behind its own lock.
pub struct RuleEngine {
    rules: Vec<AlertRule>,
    config: RuleEngineConfig,
    baseline: VolumeBaseline,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl RuleEngine {
    pub fn new(rules: Vec<AlertRule>, baseline: VolumeBaseline) -> Self {
        Self::with_config(rules, baseline, RuleEngineConfig::default())
    }

    pub fn with_config(
        rules: Vec<AlertRule>,
        baseline: VolumeBaseline,
        config: RuleEngineConfig,
    ) -> Self {
        Self {
            rules,
            config,
            baseline,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_minutes(&self) -> i64 {
        self.config.window_minutes
    }

    /// Feed a recomputed rolling baseline to the volume predicates.
    pub fn update_baseline(&self, events_per_window: f64) {
        self.baseline.update(events_per_window);
    }

    /// Evaluate all enabled rules against the batch.
    ///
    /// Duplicates never enter a window. Each rule fires at most once per
    /// batch (the highest-severity window wins) and only outside its
    /// cooldown; firing resets that rule's timer. A panicking predicate is
    /// isolated and logged without aborting the other rules or windows.
    pub fn evaluate(&self, batch: &[MonitoringEvent]) -> Vec<CrisisAlert> {
        let mut events: Vec<MonitoringEvent> =
            batch.iter().filter(|e| !e.is_duplicate).cloned().collect();
        if events.is_empty() {
            return Vec::new();
        }
        events.sort_by_key(|e| e.occurred_at);

        let windows = self.window_ranges(&events);
        let window_ms = self.config.window_minutes * 60_000;
        let mut alerts = Vec::new();

        for rule in self.rules.iter().filter(|r| r.enabled) {
            if self.in_cooldown(rule) {
                debug!(rule = %rule.id, "rule in cooldown, skipping");
                continue;
            }

            type BestFiring = (
                Severity,
                Firing,
                Range<usize>,
                DateTime<Utc>,
                DateTime<Utc>,
            );
            let mut best: Option<BestFiring> = None;
            for (start, end, range) in &windows {
                let slice = &events[range.clone()];
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| (rule.predicate)(slice, window_ms)));
                match outcome {
                    Ok(Some(firing)) => {
                        let severity = firing.severity.unwrap_or(rule.severity);
                        let replace = match &best {
                            None => true,
                            Some((s, _, r, _, _)) => {
                                severity > *s || (severity == *s && range.len() > r.len())
                            }
                        };
                        if replace {
                            best = Some((severity, firing, range.clone(), *start, *end));
                        }
                    }
                    Ok(None) => {}
                    Err(_) => {
                        warn!(
                            rule = %rule.id,
                            window_start = %start,
                            "predicate panicked; window skipped"
                        );
                    }
                }
            }

            if let Some((severity, firing, range, start, end)) = best {
                self.record_firing(&rule.id);
                alerts.push(self.synthesize(rule, severity, firing, &events[range], start, end));
            }
        }

        alerts
    }

    /// Overlapping window ranges over chronologically sorted events.
    /// Bounds are inclusive-start, exclusive-end.
    fn window_ranges(
        &self,
        sorted: &[MonitoringEvent],
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>, Range<usize>)> {
        let length = Duration::minutes(self.config.window_minutes);
        let step = Duration::minutes(self.config.step_minutes);
        let earliest = sorted.first().expect("non-empty").occurred_at;
        let latest = sorted.last().expect("non-empty").occurred_at;

        let mut windows = Vec::new();
        let mut start = earliest;
        while start <= latest {
            let end = start + length;
            let lo = sorted.partition_point(|e| e.occurred_at < start);
            let hi = sorted.partition_point(|e| e.occurred_at < end);
            if lo < hi {
                windows.push((start, end, lo..hi));
            }
            start += step;
        }
        windows
    }

    fn in_cooldown(&self, rule: &AlertRule) -> bool {
        let last_fired = self.last_fired.lock().expect("cooldown lock poisoned");
        last_fired
            .get(&rule.id)
            .map(|last| Utc::now() - *last < Duration::minutes(rule.cooldown_minutes))
            .unwrap_or(false)
    }

    fn record_firing(&self, rule_id: &str) {
        self.last_fired
            .lock()
            .expect("cooldown lock poisoned")
            .insert(rule_id.to_string(), Utc::now());
    }

    #[cfg(test)]
    pub(crate) fn backdate_firing(&self, rule_id: &str, fired_at: DateTime<Utc>) {
        self.last_fired
            .lock()
            .expect("cooldown lock poisoned")
            .insert(rule_id.to_string(), fired_at);
    }

    fn synthesize(
        &self,
        rule: &AlertRule,
        severity: Severity,
        firing: Firing,
        window: &[MonitoringEvent],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> CrisisAlert {
        let total_reach: u64 = window.iter().map(|e| e.metrics.reach).sum();
        let mean_sentiment = weighted_mean_sentiment(window);

        let platforms: BTreeSet<String> = window.iter().map(|e| e.platform.clone()).collect();
        let keywords: BTreeSet<String> = window
            .iter()
            .flat_map(|e| e.keywords.iter().cloned())
            .collect();

        // Representative subset: the widest-reaching events carry the story.
        let mut by_reach: Vec<&MonitoringEvent> = window.iter().collect();
        by_reach.sort_by_key(|e| std::cmp::Reverse(e.metrics.reach));
        let trigger_event_ids: Vec<String> = by_reach
            .iter()
            .take(self.config.max_trigger_events)
            .map(|e| e.id.clone())
            .collect();

        let mut conditions = firing.conditions;
        conditions.insert(
            "window_start".to_string(),
            serde_json::Value::String(window_start.to_rfc3339()),
        );
        conditions.insert(
            "window_end".to_string(),
            serde_json::Value::String(window_end.to_rfc3339()),
        );

        let mut metadata = HashMap::new();
        metadata.insert(
            "rule_id".to_string(),
            serde_json::Value::String(rule.id.clone()),
        );
        metadata.insert(
            "window_event_count".to_string(),
            serde_json::Value::from(window.len() as u64),
        );

        CrisisAlert::builder()
            .severity(severity)
            .alert_type(rule.alert_type)
            .title(rule.name.clone())
            .description(format!(
                "{} events between {} and {}; weighted sentiment {:.2}; estimated reach {}",
                window.len(),
                window_start.format("%Y-%m-%d %H:%M UTC"),
                window_end.format("%Y-%m-%d %H:%M UTC"),
                mean_sentiment,
                total_reach,
            ))
            .trigger_event_ids(trigger_event_ids)
            .trigger_conditions(conditions)
            .affected_keywords(keywords.into_iter().collect::<Vec<_>>())
            .affected_platforms(platforms.into_iter().collect::<Vec<_>>())
            .estimated_reach(total_reach)
            .metadata(metadata)
            .build()
            .finalize()
    }
}
