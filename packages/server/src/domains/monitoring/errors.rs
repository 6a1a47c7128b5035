//! Pipeline failure taxonomy.
//!
//! Each variant carries the handling policy documented on it; callers match
//! on the variant to decide between degrade, retry, and synchronous reject.

use thiserror::Error;
use uuid::Uuid;

use crate::domains::monitoring::models::AlertStatus;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Upstream fetch failed or timed out. The cycle is skipped; the next
    /// scheduled cycle proceeds independently.
    #[error("upstream fetch from '{origin}' failed: {reason}")]
    TransientIngestion { origin: String, reason: String },

    /// Similarity lookup failed. Fail-open: the event is treated as unique so
    /// infrastructure hiccups never silently drop data.
    #[error("duplicate-detection lookup failed: {0}")]
    DuplicateDetection(#[source] anyhow::Error),

    /// Store append/flush failed after its retry. Surfaced as a failure
    /// counter, never a dropped write.
    #[error("persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    /// A predicate failed for one rule/window. Isolated; other rules and
    /// windows still evaluate.
    #[error("rule '{rule}' failed during evaluation: {reason}")]
    RuleEvaluation { rule: String, reason: String },

    /// No alert with the requested id.
    #[error("alert {id} not found")]
    AlertNotFound { id: Uuid },

    /// Rejected synchronously; alert state is unchanged.
    #[error("invalid alert transition: {from} -> {to}")]
    InvalidTransition { from: AlertStatus, to: AlertStatus },

    /// Delivery to a single subscriber failed. Never affects other
    /// subscribers or the publisher.
    #[error("broadcast delivery to subscriber {subscriber} failed")]
    BroadcastDelivery { subscriber: Uuid },
}
