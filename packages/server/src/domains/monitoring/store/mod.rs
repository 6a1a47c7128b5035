//! Event store: durable log, dedup lookup, write batching.

pub mod backend;
pub mod event_store;
pub mod postgres;
pub mod similarity;
pub mod testing;

pub use backend::BaseEventStorage;
pub use event_store::{EventStore, EventStoreConfig};
pub use postgres::PostgresEventStorage;
pub use similarity::{jaccard, rank_similar, SimilarityMatch};
pub use testing::MemoryEventStorage;
