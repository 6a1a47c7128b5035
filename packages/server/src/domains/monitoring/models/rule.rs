//! Detection rules represented as data.
//!
//! A rule is an id, a severity/type, a cooldown, and a pure predicate over a
//! window of events. The engine evaluates rules by iterating an ordered list;
//! there is no per-rule trait hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domains::monitoring::models::{AlertType, MonitoringEvent, Severity};

/// What a predicate reports when its condition holds for a window.
#[derive(Debug, Clone, Default)]
pub struct Firing {
    /// Dynamic rules override the rule's fixed severity with a band derived
    /// from how far the statistic exceeded its threshold.
    pub severity: Option<Severity>,
    /// Threshold values and observed statistics, recorded on the alert.
    pub conditions: HashMap<String, serde_json::Value>,
}

impl Firing {
    pub fn fixed() -> Self {
        Self::default()
    }

    pub fn with_severity(severity: Severity) -> Self {
        Self {
            severity: Some(severity),
            conditions: HashMap::new(),
        }
    }

    pub fn condition(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.insert(key.to_string(), value.into());
        self
    }
}

/// Pure predicate over `(window_events, window_length_millis)`.
///
/// Returns `Some(Firing)` when the rule's condition holds. Predicates must
/// not perform I/O; anything they need beyond the window (e.g. a rolling
/// baseline) is captured at construction time.
pub type RulePredicate = Arc<dyn Fn(&[MonitoringEvent], i64) -> Option<Firing> + Send + Sync>;

/// A configurable detection rule.
#[derive(Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub cooldown_minutes: i64,
    pub enabled: bool,
    pub predicate: RulePredicate,
}

impl AlertRule {
    pub fn new(
        id: &str,
        name: &str,
        severity: Severity,
        alert_type: AlertType,
        cooldown_minutes: i64,
        predicate: RulePredicate,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            severity,
            alert_type,
            cooldown_minutes,
            enabled: true,
            predicate,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl std::fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("alert_type", &self.alert_type)
            .field("cooldown_minutes", &self.cooldown_minutes)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
