//! Rule engine: sliding windows, cooldowns, reference predicates.

pub mod baseline;
pub mod engine;
pub mod predicates;

pub use baseline::VolumeBaseline;
pub use engine::{RuleEngine, RuleEngineConfig};
pub use predicates::{default_rules, weighted_mean_sentiment, RuleThresholds};
