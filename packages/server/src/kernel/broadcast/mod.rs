//! Real-time fan-out to live subscribers, scoped by named channels.

pub mod hub;
pub mod message;
pub mod subscriber;

pub use hub::{BroadcastHub, BroadcastHubConfig, HubEvent};
pub use message::{channels, BroadcastMessage, MessageType};
pub use subscriber::{ConnectionState, SubscriberHandle};
