//! End-to-end pipeline scenarios over in-memory dependencies.

mod common;

use chrono::{Duration, Utc};

use common::{distinct_event, monitor, viral_negative_event};
use server_core::domains::monitoring::models::{AlertStatus, AlertType, Severity};
use server_core::kernel::broadcast::{channels, MessageType};

#[tokio::test]
async fn hour_of_volume_above_the_floor_raises_one_spike_alert() {
    let (test_deps, monitor) = monitor();

    // 101 events spread over one hour with a floor of 100.
    let base = Utc::now() - Duration::hours(1);
    let events = (0..101)
        .map(|i| distinct_event(i, base + Duration::seconds(i as i64 * 30)))
        .collect();

    let outcome = monitor.process_events(events).await.unwrap();
    assert_eq!(outcome.accepted, 101);
    assert_eq!(outcome.filtered, 0);
    assert_eq!(outcome.alerts, 1);

    let alerts = monitor.active_alerts().await.unwrap();
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(alert.alert_type, AlertType::VolumeSpike);
    assert_eq!(alert.status, AlertStatus::Active);
    // top-5 representative subset of the batch
    assert_eq!(alert.trigger_event_ids.len(), 5);
    assert!(alert
        .trigger_event_ids
        .iter()
        .all(|id| id.starts_with("testwire:")));

    test_deps.deps.store.flush().await.unwrap();
    assert_eq!(test_deps.backend.event_count().await, 101);
}

#[tokio::test]
async fn volume_exactly_at_the_floor_is_quiet() {
    let (_test_deps, monitor) = monitor();

    let base = Utc::now() - Duration::hours(1);
    let events = (0..100)
        .map(|i| distinct_event(i, base + Duration::seconds(i as i64 * 30)))
        .collect();

    let outcome = monitor.process_events(events).await.unwrap();
    assert_eq!(outcome.accepted, 100);
    assert_eq!(outcome.alerts, 0);
    assert!(monitor.active_alerts().await.unwrap().is_empty());
}

#[tokio::test]
async fn viral_negative_mentions_raise_an_escalated_critical_alert() {
    let (test_deps, monitor) = monitor();

    let now = Utc::now();
    let events = (0..3)
        .map(|i| viral_negative_event(i, now - Duration::minutes(i as i64)))
        .collect();

    let outcome = monitor.process_events(events).await.unwrap();
    assert_eq!(outcome.alerts, 1);

    let alerts = monitor.active_alerts().await.unwrap();
    let alert = &alerts[0];
    assert_eq!(alert.alert_type, AlertType::ViralNegative);
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert.escalated);

    // the dispatcher saw the new alert exactly once
    let dispatched = test_deps.notifier.dispatched().await;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].id, alert.id);
}

#[tokio::test]
async fn reingesting_the_same_id_changes_nothing() {
    let (test_deps, monitor) = monitor();
    let event = distinct_event(1, Utc::now());

    let first = monitor.process_events(vec![event.clone()]).await.unwrap();
    assert_eq!(first.accepted, 1);
    assert_eq!(first.filtered, 0);

    let second = monitor.process_events(vec![event]).await.unwrap();
    assert_eq!(second.accepted, 0);
    assert_eq!(second.filtered, 1);

    let metrics = monitor.get_metrics();
    assert_eq!(metrics.duplicates_filtered, 1);
    assert_eq!(metrics.events_processed_total, 2);

    test_deps.deps.store.flush().await.unwrap();
    assert_eq!(test_deps.backend.event_count().await, 1);
}

#[tokio::test]
async fn near_identical_content_across_batches_is_filtered() {
    let (test_deps, monitor) = monitor();

    let original = distinct_event(1, Utc::now());
    monitor.process_events(vec![original]).await.unwrap();

    // Same story from another feed: new id, same words.
    let mut echo = distinct_event(1, Utc::now());
    echo.id = "otherwire:99".to_string();
    let outcome = monitor.process_events(vec![echo]).await.unwrap();

    assert_eq!(outcome.filtered, 1);
    assert_eq!(monitor.get_metrics().duplicates_filtered, 1);
    test_deps.deps.store.flush().await.unwrap();
    assert_eq!(test_deps.backend.event_count().await, 1);
}

#[tokio::test]
async fn critical_channel_subscribers_see_only_critical_alerts() {
    let (test_deps, monitor) = monitor();
    let mut critical_rx = test_deps
        .deps
        .hub
        .connect_with(&[channels::ALERTS_CRITICAL])
        .await;

    // Low-severity volume spike: goes to alerts.all only.
    let base = Utc::now() - Duration::hours(1);
    let events = (0..101)
        .map(|i| distinct_event(i, base + Duration::seconds(i as i64 * 30)))
        .collect();
    monitor.process_events(events).await.unwrap();
    assert!(critical_rx.receiver.try_recv().is_err());

    // Critical viral alert: exactly one message arrives.
    let events = (200..203)
        .map(|i| viral_negative_event(i, Utc::now()))
        .collect();
    monitor.process_events(events).await.unwrap();

    let message = critical_rx.receiver.recv().await.unwrap();
    assert_eq!(message.message_type, MessageType::Alert);
    assert_eq!(message.channel, "alerts.critical");
    assert_eq!(message.data["severity"], "critical");
    assert!(critical_rx.receiver.try_recv().is_err());
}

#[tokio::test]
async fn cooldown_holds_back_a_rule_that_keeps_matching() {
    let (_test_deps, monitor) = monitor();

    let first = monitor
        .process_events(vec![viral_negative_event(1, Utc::now())])
        .await
        .unwrap();
    assert_eq!(first.alerts, 1);

    // Predicate-true again well inside the cooldown window.
    let second = monitor
        .process_events(vec![viral_negative_event(2, Utc::now())])
        .await
        .unwrap();
    assert_eq!(second.alerts, 0);

    assert_eq!(monitor.active_alerts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn acknowledge_then_resolve_matches_direct_resolve() {
    let (_test_deps, monitor) = monitor();

    let now = Utc::now();
    monitor
        .process_events(vec![viral_negative_event(1, now)])
        .await
        .unwrap();
    let staged = monitor.active_alerts().await.unwrap()[0].clone();

    // An independent alert for the direct path (separate monitor, so the
    // cooldown of the first firing does not interfere).
    let (_other_deps, other_monitor) = monitor2();
    other_monitor
        .process_events(vec![viral_negative_event(2, now)])
        .await
        .unwrap();
    let direct = other_monitor.active_alerts().await.unwrap()[0].clone();

    let acked = monitor
        .acknowledge_alert(staged.id, "oncall")
        .await
        .unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    let staged_final = monitor.resolve_alert(staged.id, "oncall").await.unwrap();

    let direct_final = other_monitor
        .resolve_alert(direct.id, "oncall")
        .await
        .unwrap();

    assert_eq!(staged_final.status, AlertStatus::Resolved);
    assert_eq!(direct_final.status, AlertStatus::Resolved);
}

// Alias so the test above reads naturally.
fn monitor2() -> (
    server_core::kernel::test_dependencies::TestDependencies,
    std::sync::Arc<server_core::domains::monitoring::pipeline::CrisisMonitor>,
) {
    monitor()
}

#[tokio::test]
async fn resolved_alerts_reject_further_transitions() {
    let (_test_deps, monitor) = monitor();
    monitor
        .process_events(vec![viral_negative_event(1, Utc::now())])
        .await
        .unwrap();
    let alert = monitor.active_alerts().await.unwrap()[0].clone();

    monitor.resolve_alert(alert.id, "oncall").await.unwrap();
    assert!(monitor.acknowledge_alert(alert.id, "oncall").await.is_err());
    assert!(monitor.active_alerts().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let (_test_deps, monitor) = monitor();
    let outcome = monitor.process_events(Vec::new()).await.unwrap();

    assert_eq!(outcome.accepted, 0);
    assert_eq!(outcome.filtered, 0);
    assert_eq!(outcome.alerts, 0);

    let metrics = monitor.get_metrics();
    assert_eq!(metrics.events_processed_total, 0);
    assert_eq!(metrics.alerts_generated, 0);
}

#[tokio::test]
async fn polled_and_pushed_events_share_one_pipeline() {
    let (test_deps, monitor) = monitor();

    // Queue a batch on the scripted source, then start the poll loop.
    test_deps
        .source
        .push_batch(vec![distinct_event(1, Utc::now())])
        .await;
    monitor.start().await.unwrap();

    // The first tick fires immediately; give it a moment to drain.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Push the same id through the webhook path: same dedup outcome.
    let outcome = monitor
        .process_events(vec![distinct_event(1, Utc::now())])
        .await
        .unwrap();
    assert_eq!(outcome.filtered, 1);
    assert!(monitor.is_healthy());

    monitor.stop().await;
}
