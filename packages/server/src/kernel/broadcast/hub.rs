//! In-process fan-out hub for live subscribers.
//!
//! Subscribers connect, opt into named channels, and receive
//! [`BroadcastMessage`]s over a bounded per-subscriber queue. Delivery is
//! best-effort with no retry: a full or closed queue disconnects that
//! subscriber only, so one slow consumer can never back-pressure the
//! fan-out or starve the others.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::{channels, BroadcastMessage, MessageType};
use super::subscriber::{ConnectionState, SubscriberEntry, SubscriberHandle};
use crate::domains::monitoring::errors::MonitorError;

#[derive(Debug, Clone)]
pub struct BroadcastHubConfig {
    /// Bounded per-subscriber queue depth.
    pub queue_capacity: usize,
    /// How often the hub probes connections with a heartbeat message.
    pub heartbeat_interval: Duration,
    /// A connection silent for longer than this is forcibly disconnected.
    pub stale_after: Duration,
}

impl Default for BroadcastHubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            heartbeat_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Connection lifecycle notifications other components may react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubEvent {
    Connected(Uuid),
    Disconnected(Uuid),
}

/// Thread-safe, cloneable fan-out hub keyed by the fixed channel registry.
#[derive(Clone)]
pub struct BroadcastHub {
    subscribers: Arc<RwLock<HashMap<Uuid, SubscriberEntry>>>,
    config: BroadcastHubConfig,
    events_tx: broadcast::Sender<HubEvent>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_config(BroadcastHubConfig::default())
    }

    pub fn with_config(config: BroadcastHubConfig) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            config,
            events_tx,
        }
    }

    /// Register a new subscriber with the default channel membership.
    pub async fn connect(&self) -> SubscriberHandle {
        self.connect_with(channels::DEFAULTS).await
    }

    /// Register a new subscriber on the given channels. Unknown channel
    /// names are silently dropped.
    pub async fn connect_with(&self, requested: &[&str]) -> SubscriberHandle {
        let id = Uuid::new_v4();
        let membership: HashSet<String> = requested
            .iter()
            .filter(|name| channels::is_known(name))
            .map(|name| name.to_string())
            .collect();

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let mut entry = SubscriberEntry::new(id, membership, tx);
        entry.transition(ConnectionState::Open);

        self.subscribers.write().await.insert(id, entry);
        let _ = self.events_tx.send(HubEvent::Connected(id));
        debug!(subscriber = %id, "subscriber connected");

        SubscriberHandle { id, receiver: rx }
    }

    /// Remove a subscriber and release its resources.
    pub async fn disconnect(&self, id: Uuid) {
        let removed = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.remove(&id).map(|mut entry| {
                entry.transition(ConnectionState::Closing);
                entry.transition(ConnectionState::Closed);
                entry.connected_at
            })
        };
        if let Some(connected_at) = removed {
            let _ = self.events_tx.send(HubEvent::Disconnected(id));
            debug!(subscriber = %id, connected_since = %connected_at, "subscriber disconnected");
        }
    }

    /// Add channels to a subscriber's membership. Unknown names are
    /// silently ignored.
    pub async fn subscribe(&self, id: Uuid, names: &[&str]) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(entry) = subscribers.get_mut(&id) {
            for name in names.iter().filter(|n| channels::is_known(n)) {
                entry.channels.insert(name.to_string());
            }
        }
    }

    /// Remove channels from a subscriber's membership.
    pub async fn unsubscribe(&self, id: Uuid, names: &[&str]) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(entry) = subscribers.get_mut(&id) {
            for name in names {
                entry.channels.remove(*name);
            }
        }
    }

    /// Current channel membership, mainly for diagnostics.
    pub async fn channels_of(&self, id: Uuid) -> Option<HashSet<String>> {
        self.subscribers
            .read()
            .await
            .get(&id)
            .map(|entry| entry.channels.clone())
    }

    /// Record a liveness signal from a subscriber's transport.
    pub async fn heartbeat(&self, id: Uuid) {
        if let Some(entry) = self.subscribers.write().await.get_mut(&id) {
            entry.touch();
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Observe connect/disconnect events.
    pub fn hub_events(&self) -> broadcast::Receiver<HubEvent> {
        self.events_tx.subscribe()
    }

    /// Deliver a message to every current subscriber of `channel`.
    /// Returns the number of successful deliveries.
    pub async fn publish(
        &self,
        channel: &str,
        message_type: MessageType,
        data: serde_json::Value,
    ) -> usize {
        if !channels::is_known(channel) {
            debug!(channel, "publish to unknown channel dropped");
            return 0;
        }
        let message = BroadcastMessage::new(message_type, channel, data);
        self.deliver(&message, Some(channel)).await
    }

    /// Operator-triggered system-wide notice: bypasses channel membership
    /// and reaches every connected subscriber.
    pub async fn emergency_broadcast(&self, data: serde_json::Value) -> usize {
        let message = BroadcastMessage::new(MessageType::Alert, "emergency", data);
        self.deliver(&message, None).await
    }

    /// Fan a message out to either one channel's members or (with `None`)
    /// everyone. Failed sends evict only the failing subscriber.
    async fn deliver(&self, message: &BroadcastMessage, channel: Option<&str>) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<BroadcastMessage>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .values()
                .filter(|entry| {
                    entry.state == ConnectionState::Open
                        && channel
                            .map(|name| entry.channels.contains(name))
                            .unwrap_or(true)
                })
                .map(|entry| (entry.id, entry.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => failed.push(id),
            }
        }

        for id in failed {
            warn!(
                error = %MonitorError::BroadcastDelivery { subscriber: id },
                "evicting subscriber after failed delivery"
            );
            self.disconnect(id).await;
        }

        delivered
    }

    /// One heartbeat pass: probe every connection, then evict the stale
    /// ones. A successful probe counts as liveness; a closed queue evicts
    /// immediately.
    pub async fn probe_once(&self) {
        let targets: Vec<(Uuid, mpsc::Sender<BroadcastMessage>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .values()
                .map(|entry| (entry.id, entry.sender.clone()))
                .collect()
        };

        let mut alive = Vec::new();
        let mut closed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(BroadcastMessage::heartbeat()) {
                Ok(()) => alive.push(id),
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
                Err(mpsc::error::TrySendError::Full(_)) => {}
            }
        }

        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let mut evict = closed;
        {
            let mut subscribers = self.subscribers.write().await;
            for id in alive {
                if let Some(entry) = subscribers.get_mut(&id) {
                    entry.touch();
                }
            }
            for entry in subscribers.values() {
                if entry.is_stale(stale_after) {
                    evict.push(entry.id);
                }
            }
        }

        for id in evict {
            info!(subscriber = %id, "evicting silent subscriber");
            self.disconnect(id).await;
        }
    }

    /// Spawn the periodic heartbeat/eviction sweeper.
    pub fn spawn_heartbeat_sweeper(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(hub.config.heartbeat_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => hub.probe_once().await,
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn backdate_last_seen(&self, id: Uuid, minutes: i64) {
        if let Some(entry) = self.subscribers.write().await.get_mut(&id) {
            entry.last_seen = chrono::Utc::now() - chrono::Duration::minutes(minutes);
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
