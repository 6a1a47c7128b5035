//! Crisis alerts and their lifecycle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::domains::monitoring::errors::MonitorError;

/// Alert severity, ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(anyhow::anyhow!("Invalid severity: {}", s)),
        }
    }
}

/// The anomaly pattern an alert was synthesized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    VolumeSpike,
    SentimentDrop,
    NegativeTrend,
    ViralNegative,
    Custom,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertType::VolumeSpike => write!(f, "volume_spike"),
            AlertType::SentimentDrop => write!(f, "sentiment_drop"),
            AlertType::NegativeTrend => write!(f, "negative_trend"),
            AlertType::ViralNegative => write!(f, "viral_negative"),
            AlertType::Custom => write!(f, "custom"),
        }
    }
}

/// Alert lifecycle status. Moves only forward:
/// active → acknowledged → resolved, or active → resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    /// Whether a transition from `self` to `to` is legal.
    pub fn can_transition_to(self, to: AlertStatus) -> bool {
        matches!(
            (self, to),
            (AlertStatus::Active, AlertStatus::Acknowledged)
                | (AlertStatus::Active, AlertStatus::Resolved)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
        )
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(anyhow::anyhow!("Invalid alert status: {}", s)),
        }
    }
}

/// A detected anomaly with a tracked lifecycle.
///
/// Created by the rule engine when a rule fires outside its cooldown,
/// mutated only through [`CrisisAlert::transition`], never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct CrisisAlert {
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,
    pub severity: Severity,
    pub alert_type: AlertType,
    pub title: String,
    pub description: String,
    #[builder(default)]
    pub trigger_event_ids: Vec<String>,
    #[builder(default)]
    pub trigger_conditions: HashMap<String, serde_json::Value>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
    #[builder(default)]
    pub status: AlertStatus,
    #[builder(default)]
    pub escalated: bool,
    #[builder(default)]
    pub affected_keywords: Vec<String>,
    #[builder(default)]
    pub affected_platforms: Vec<String>,
    #[builder(default = 0)]
    pub estimated_reach: u64,
    #[builder(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CrisisAlert {
    /// Finalize a freshly built alert: critical alerts are escalated at
    /// creation and the flag is never cleared afterwards.
    pub fn finalize(mut self) -> Self {
        if self.severity == Severity::Critical {
            self.escalated = true;
        }
        self
    }

    /// Apply a status transition, enforcing monotonicity.
    ///
    /// On an illegal transition the alert is left untouched (including
    /// `updated_at`) and an [`MonitorError::InvalidTransition`] is returned.
    pub fn transition(&mut self, to: AlertStatus, actor: &str) -> Result<(), MonitorError> {
        if !self.status.can_transition_to(to) {
            return Err(MonitorError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.updated_at = Utc::now();
        let key = match to {
            AlertStatus::Acknowledged => "acknowledged_by",
            AlertStatus::Resolved => "resolved_by",
            AlertStatus::Active => unreachable!("no transition leads back to active"),
        };
        self.metadata
            .insert(key.to_string(), serde_json::Value::String(actor.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert(severity: Severity) -> CrisisAlert {
        CrisisAlert::builder()
            .severity(severity)
            .alert_type(AlertType::VolumeSpike)
            .title("Mention volume spike")
            .description("214 mentions in the last hour")
            .build()
            .finalize()
    }

    #[test]
    fn new_alert_starts_active() {
        let alert = sample_alert(Severity::Medium);
        assert_eq!(alert.status, AlertStatus::Active);
        assert!(!alert.escalated);
    }

    #[test]
    fn critical_alert_is_escalated_at_creation() {
        let alert = sample_alert(Severity::Critical);
        assert!(alert.escalated);
    }

    #[test]
    fn acknowledge_then_resolve_is_legal() {
        let mut alert = sample_alert(Severity::High);
        alert.transition(AlertStatus::Acknowledged, "ana").unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        alert.transition(AlertStatus::Resolved, "ana").unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(
            alert.metadata.get("acknowledged_by"),
            Some(&serde_json::Value::String("ana".into()))
        );
    }

    #[test]
    fn direct_resolve_is_legal() {
        let mut alert = sample_alert(Severity::High);
        alert.transition(AlertStatus::Resolved, "ben").unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
    }

    #[test]
    fn resolved_alert_cannot_reactivate() {
        let mut alert = sample_alert(Severity::High);
        alert.transition(AlertStatus::Resolved, "ben").unwrap();
        let before = alert.updated_at;

        let err = alert.transition(AlertStatus::Active, "ben").unwrap_err();
        assert!(matches!(err, MonitorError::InvalidTransition { .. }));
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.updated_at, before);
    }

    #[test]
    fn resolved_alert_cannot_be_acknowledged() {
        let mut alert = sample_alert(Severity::Low);
        alert.transition(AlertStatus::Resolved, "ben").unwrap();
        assert!(alert.transition(AlertStatus::Acknowledged, "ben").is_err());
    }

    #[test]
    fn transition_bumps_updated_at() {
        let mut alert = sample_alert(Severity::Low);
        let created = alert.created_at;
        alert.transition(AlertStatus::Acknowledged, "cam").unwrap();
        assert!(alert.updated_at >= created);
    }

    #[test]
    fn severity_ordering_is_ascending() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }
}
