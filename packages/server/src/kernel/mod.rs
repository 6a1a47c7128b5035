//! Kernel module - server infrastructure and dependencies.

pub mod broadcast;
pub mod deps;
pub mod scheduled_tasks;
pub mod sse;
pub mod test_dependencies;
pub mod traits;

pub use broadcast::{
    channels, BroadcastHub, BroadcastHubConfig, BroadcastMessage, HubEvent, MessageType,
    SubscriberHandle,
};
pub use deps::ServerDeps;
pub use test_dependencies::{TestDependencies, TestListeningSource, TestNotifier};
pub use traits::{BaseListeningSource, BaseNotificationDispatcher, SourceHealth, SourceStatus};
