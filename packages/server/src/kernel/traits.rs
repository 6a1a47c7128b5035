// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// The pipeline consumes listening services and notification channels
// exclusively through these, so tests can swap in doubles.
//
// Naming convention: Base* for trait names (e.g., BaseListeningSource)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::monitoring::models::{CrisisAlert, MonitoringEvent};

// =============================================================================
// Listening Source Trait (Infrastructure - upstream mention feeds)
// =============================================================================

/// Health report from an upstream listening service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub status: SourceStatus,
    pub last_error: Option<String>,
    pub rate_limit_remaining: Option<u32>,
    pub response_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl SourceHealth {
    pub fn healthy() -> Self {
        Self {
            status: SourceStatus::Healthy,
            last_error: None,
            rate_limit_remaining: None,
            response_time_ms: None,
        }
    }

    pub fn unhealthy(error: &str) -> Self {
        Self {
            status: SourceStatus::Unhealthy,
            last_error: Some(error.to_string()),
            rate_limit_remaining: None,
            response_time_ms: None,
        }
    }
}

/// An upstream listening service already mapped to the canonical event
/// model. Authentication, pagination, and field mapping live behind this
/// boundary.
#[async_trait]
pub trait BaseListeningSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch events recorded since the given instant (all available events
    /// when `None`). Missing numeric metrics default to zero.
    async fn fetch_events(&self, since: Option<DateTime<Utc>>) -> Result<Vec<MonitoringEvent>>;

    async fn health_check(&self) -> SourceHealth;

    async fn is_healthy(&self) -> bool {
        self.health_check().await.status != SourceStatus::Unhealthy
    }
}

// =============================================================================
// Notification Dispatch Trait (Infrastructure - outbound alerting)
// =============================================================================

/// Outbound notification fan-out (email/SMS/webhook). Receives each new
/// alert exactly once; retry policy belongs to the dispatcher, not the
/// pipeline.
#[async_trait]
pub trait BaseNotificationDispatcher: Send + Sync {
    async fn dispatch(&self, alert: &CrisisAlert) -> Result<()>;
}

/// Fallback dispatcher for deployments without outbound channels wired up.
pub struct LogNotificationDispatcher;

#[async_trait]
impl BaseNotificationDispatcher for LogNotificationDispatcher {
    async fn dispatch(&self, alert: &CrisisAlert) -> Result<()> {
        tracing::info!(
            alert_id = %alert.id,
            severity = %alert.severity,
            "alert notification (no outbound channels configured)"
        );
        Ok(())
    }
}
