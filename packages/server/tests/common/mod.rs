//! Shared helpers for integration tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use server_core::domains::monitoring::models::{
    EventType, MonitoringEvent, Sentiment, SentimentLabel,
};
use server_core::domains::monitoring::pipeline::{CrisisMonitor, MonitorConfig};
use server_core::domains::monitoring::rules::{
    default_rules, RuleEngine, RuleThresholds, VolumeBaseline,
};
use server_core::kernel::test_dependencies::TestDependencies;

/// Fully wired monitor over in-memory dependencies with the default rule
/// set and thresholds.
pub fn monitor() -> (TestDependencies, Arc<CrisisMonitor>) {
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

/// An event with enough unique vocabulary that the dedup layer never
/// mistakes two different indices for the same story.
pub fn distinct_event(i: usize, at: DateTime<Utc>) -> MonitoringEvent {
    let mut event = MonitoringEvent::builder()
        .id(format!("testwire:{i}"))
        .source_name("testwire")
        .event_type(EventType::Social)
        .occurred_at(at)
        .title(format!("mention number {i}"))
        .body(format!("alpha{i} beta{i} gamma{i} delta{i} epsilon{i}"))
        .platform("twitter")
        .build();
    event.author.name = format!("reporter{i}");
    event
}

/// A strongly negative, widely seen event.
pub fn viral_negative_event(i: usize, at: DateTime<Utc>) -> MonitoringEvent {
    let mut event = distinct_event(i, at);
    event.sentiment = Sentiment::new(-0.9, SentimentLabel::Negative, 0.9);
    event.metrics.reach = 50_000;
    event
}
