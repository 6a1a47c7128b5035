//! Per-subscriber connection state.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::message::BroadcastMessage;

/// Connection lifecycle, independent of transport. Heartbeats keep a
/// connection `Open`; eviction walks it through `Closing` to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        matches!(
            (self, to),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Connecting, ConnectionState::Closing)
                | (ConnectionState::Open, ConnectionState::Closing)
                | (ConnectionState::Closing, ConnectionState::Closed)
        )
    }
}

/// Registry-side record of one connection.
pub(crate) struct SubscriberEntry {
    pub id: Uuid,
    pub channels: HashSet<String>,
    pub sender: mpsc::Sender<BroadcastMessage>,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl SubscriberEntry {
    pub fn new(id: Uuid, channels: HashSet<String>, sender: mpsc::Sender<BroadcastMessage>) -> Self {
        let now = Utc::now();
        Self {
            id,
            channels,
            sender,
            state: ConnectionState::Connecting,
            connected_at: now,
            last_seen: now,
        }
    }

    pub fn transition(&mut self, to: ConnectionState) -> bool {
        if self.state.can_transition_to(to) {
            self.state = to;
            true
        } else {
            false
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    pub fn is_stale(&self, stale_after: chrono::Duration) -> bool {
        Utc::now() - self.last_seen > stale_after
    }
}

/// Client-side handle returned by `connect()`: the subscriber id plus the
/// receiving end of its message queue.
pub struct SubscriberHandle {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<BroadcastMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward_only() {
        assert!(ConnectionState::Connecting.can_transition_to(ConnectionState::Open));
        assert!(ConnectionState::Open.can_transition_to(ConnectionState::Closing));
        assert!(ConnectionState::Closing.can_transition_to(ConnectionState::Closed));

        assert!(!ConnectionState::Closed.can_transition_to(ConnectionState::Open));
        assert!(!ConnectionState::Open.can_transition_to(ConnectionState::Connecting));
        assert!(!ConnectionState::Closing.can_transition_to(ConnectionState::Open));
    }

    #[test]
    fn illegal_transition_leaves_state() {
        let (tx, _rx) = mpsc::channel(1);
        let mut entry = SubscriberEntry::new(Uuid::new_v4(), HashSet::new(), tx);
        entry.transition(ConnectionState::Open);

        assert!(!entry.transition(ConnectionState::Connecting));
        assert_eq!(entry.state, ConnectionState::Open);
    }

    #[test]
    fn staleness_follows_last_seen() {
        let (tx, _rx) = mpsc::channel(1);
        let mut entry = SubscriberEntry::new(Uuid::new_v4(), HashSet::new(), tx);
        assert!(!entry.is_stale(chrono::Duration::minutes(5)));

        entry.last_seen = Utc::now() - chrono::Duration::minutes(6);
        assert!(entry.is_stale(chrono::Duration::minutes(5)));

        entry.touch();
        assert!(!entry.is_stale(chrono::Duration::minutes(5)));
    }
}
