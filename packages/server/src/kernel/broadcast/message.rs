//! Wire format for live fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named channels subscribers may opt into. Fixed registry: subscription
/// requests naming anything else are silently ignored.
pub mod channels {
    pub const EVENTS_ALL: &str = "events.all";
    pub const EVENTS_CRISIS: &str = "events.crisis";
    pub const ALERTS_ALL: &str = "alerts.all";
    pub const ALERTS_CRITICAL: &str = "alerts.critical";
    pub const METRICS: &str = "metrics";

    pub const REGISTRY: &[&str] = &[EVENTS_ALL, EVENTS_CRISIS, ALERTS_ALL, ALERTS_CRITICAL, METRICS];

    /// Default membership for a fresh connection.
    pub const DEFAULTS: &[&str] = &[EVENTS_ALL, ALERTS_ALL];

    pub fn is_known(name: &str) -> bool {
        REGISTRY.contains(&name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Event,
    Alert,
    AlertUpdate,
    Metric,
    Heartbeat,
}

/// One JSON object per message: `{type, channel, timestamp, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl BroadcastMessage {
    pub fn new(message_type: MessageType, channel: &str, data: serde_json::Value) -> Self {
        Self {
            message_type,
            channel: channel.to_string(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(MessageType::Heartbeat, "system", serde_json::json!({}))
    }
}
