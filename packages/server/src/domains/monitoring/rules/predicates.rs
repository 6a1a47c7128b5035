//! Reference detection predicates and their canonical thresholds.

use std::sync::Arc;

use super::baseline::VolumeBaseline;
use crate::domains::monitoring::models::{
    AlertRule, AlertType, Firing, MonitoringEvent, Severity,
};

/// Canonical threshold set for the built-in rules.
#[derive(Debug, Clone)]
pub struct RuleThresholds {
    /// Minimum window volume before a spike can fire at all.
    pub volume_floor: usize,
    /// Multiplier applied to the rolling baseline.
    pub spike_multiplier: f64,
    /// Weighted mean sentiment below this is a sentiment crisis.
    pub weighted_sentiment_threshold: f64,
    /// Quiet-but-negative windows are not a crisis: minimum volume for the
    /// sentiment rule.
    pub sentiment_volume_floor: usize,
    /// Single-event sentiment below this counts as strongly negative.
    pub viral_sentiment: f64,
    /// Single-event reach above this counts as viral.
    pub viral_reach: u64,
    /// Second-half mean must sit at least this far below the first-half
    /// mean for a negative trend.
    pub trend_delta: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            volume_floor: 100,
            spike_multiplier: 3.0,
            weighted_sentiment_threshold: -0.5,
            sentiment_volume_floor: 10,
            viral_sentiment: -0.7,
            viral_reach: 10_000,
            trend_delta: 0.3,
        }
    }
}

/// Mean sentiment weighted by reach and model confidence, so one viral post
/// moves the needle more than a dozen unseen ones.
pub fn weighted_mean_sentiment(events: &[MonitoringEvent]) -> f64 {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for event in events {
        let weight = (event.metrics.reach.max(1) as f64) * event.sentiment.confidence.max(0.01);
        weighted_sum += event.sentiment.score * weight;
        total_weight += weight;
    }
    if total_weight == 0.0 {
        0.0
    } else {
        weighted_sum / total_weight
    }
}

fn spike_severity(ratio: f64) -> Severity {
    if ratio < 1.25 {
        Severity::Low
    } else if ratio < 1.75 {
        Severity::Medium
    } else if ratio < 2.5 {
        Severity::High
    } else {
        Severity::Critical
    }
}

/// Volume spike: window count strictly above
/// `max(floor, baseline × multiplier)`. Severity scales with the ratio to
/// that threshold.
pub fn volume_spike_rule(thresholds: &RuleThresholds, baseline: VolumeBaseline) -> AlertRule {
    let floor = thresholds.volume_floor;
    let multiplier = thresholds.spike_multiplier;
    AlertRule::new(
        "volume_spike",
        "Mention volume spike",
        Severity::Medium,
        AlertType::VolumeSpike,
        30,
        Arc::new(move |events, _window_ms| {
            let count = events.len();
            let base = baseline.events_per_window();
            let threshold = (base * multiplier).max(floor as f64);
            if (count as f64) <= threshold {
                return None;
            }
            let ratio = count as f64 / threshold;
            Some(
                Firing::with_severity(spike_severity(ratio))
                    .condition("event_count", count as u64)
                    .condition("threshold", threshold)
                    .condition("baseline_per_window", base)
                    .condition("ratio", ratio),
            )
        }),
    )
}

/// Sentiment crisis: strongly negative weighted mean with enough volume to
/// matter.
pub fn sentiment_drop_rule(thresholds: &RuleThresholds) -> AlertRule {
    let threshold = thresholds.weighted_sentiment_threshold;
    let floor = thresholds.sentiment_volume_floor;
    AlertRule::new(
        "sentiment_drop",
        "Sentiment crisis",
        Severity::High,
        AlertType::SentimentDrop,
        60,
        Arc::new(move |events, _window_ms| {
            if events.len() < floor {
                return None;
            }
            let mean = weighted_mean_sentiment(events);
            if mean >= threshold {
                return None;
            }
            Some(
                Firing::fixed()
                    .condition("weighted_mean_sentiment", mean)
                    .condition("threshold", threshold)
                    .condition("event_count", events.len() as u64),
            )
        }),
    )
}

/// Viral negative: a single strongly negative event with viral reach.
pub fn viral_negative_rule(thresholds: &RuleThresholds) -> AlertRule {
    let sentiment = thresholds.viral_sentiment;
    let reach = thresholds.viral_reach;
    AlertRule::new(
        "viral_negative",
        "Viral negative mention",
        Severity::Critical,
        AlertType::ViralNegative,
        15,
        Arc::new(move |events, _window_ms| {
            let hit = events
                .iter()
                .find(|e| e.sentiment.score < sentiment && e.metrics.reach > reach)?;
            Some(
                Firing::fixed()
                    .condition("event_id", hit.id.clone())
                    .condition("reach", hit.metrics.reach)
                    .condition("sentiment_score", hit.sentiment.score),
            )
        }),
    )
}

/// Negative trend: the window's second half is markedly more negative than
/// its first half. Expects chronologically ordered events (the engine
/// guarantees window order).
pub fn negative_trend_rule(thresholds: &RuleThresholds) -> AlertRule {
    let delta = thresholds.trend_delta;
    AlertRule::new(
        "negative_trend",
        "Negative sentiment trend",
        Severity::Medium,
        AlertType::NegativeTrend,
        120,
        Arc::new(move |events, _window_ms| {
            if events.len() < 4 {
                return None;
            }
            let mid = events.len() / 2;
            let first: f64 = events[..mid].iter().map(|e| e.sentiment.score).sum::<f64>()
                / mid as f64;
            let second: f64 = events[mid..].iter().map(|e| e.sentiment.score).sum::<f64>()
                / (events.len() - mid) as f64;
            if second > first - delta {
                return None;
            }
            Some(
                Firing::fixed()
                    .condition("first_half_mean", first)
                    .condition("second_half_mean", second)
                    .condition("delta", first - second),
            )
        }),
    )
}

/// The built-in rule set, in evaluation order.
pub fn default_rules(thresholds: &RuleThresholds, baseline: VolumeBaseline) -> Vec<AlertRule> {
    vec![
        volume_spike_rule(thresholds, baseline),
        sentiment_drop_rule(thresholds),
        viral_negative_rule(thresholds),
        negative_trend_rule(thresholds),
    ]
}
