//! Normalized listening-service record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::common::utils::content_hash;

/// Kind of record a listening service produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Mention,
    News,
    Social,
    Review,
    Forum,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Mention => write!(f, "mention"),
            EventType::News => write!(f, "news"),
            EventType::Social => write!(f, "social"),
            EventType::Review => write!(f, "review"),
            EventType::Forum => write!(f, "forum"),
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "mention" => Ok(EventType::Mention),
            "news" => Ok(EventType::News),
            "social" => Ok(EventType::Social),
            "review" => Ok(EventType::Review),
            "forum" => Ok(EventType::Forum),
            _ => Err(anyhow::anyhow!("Invalid event type: {}", s)),
        }
    }
}

/// Sentiment classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentLabel::Positive => write!(f, "positive"),
            SentimentLabel::Negative => write!(f, "negative"),
            SentimentLabel::Neutral => write!(f, "neutral"),
        }
    }
}

/// Sentiment of an event. Score is clamped to [-1, 1], confidence to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f64,
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl Sentiment {
    pub fn new(score: f64, label: SentimentLabel, confidence: f64) -> Self {
        Self {
            score: score.clamp(-1.0, 1.0),
            label,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn neutral() -> Self {
        Self::new(0.0, SentimentLabel::Neutral, 0.5)
    }

    /// Scale confidence by a per-source trust weight. The score itself is
    /// never adjusted after ingestion.
    pub fn weight_confidence(&mut self, trust: f64) {
        self.confidence = (self.confidence * trust).clamp(0.0, 1.0);
    }
}

impl Default for Sentiment {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Author of the mention. Handle and audience data are often missing for
/// news/forum sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Author {
    pub name: String,
    #[builder(default, setter(strip_option))]
    pub handle: Option<String>,
    #[builder(default, setter(strip_option))]
    pub follower_count: Option<u64>,
    #[builder(default, setter(strip_option))]
    pub verified: Option<bool>,
}

/// Engagement metrics. Listening services report these sparsely, so every
/// field defaults to zero when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventMetrics {
    #[serde(default)]
    pub reach: u64,
    #[serde(default)]
    pub engagement: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub comments: u64,
}

/// A normalized mention/news/social record ingested from a listening source.
///
/// The id is source-qualified (e.g. `brandwire:18423991`), stable, and
/// globally unique; re-ingesting the same id is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct MonitoringEvent {
    pub id: String,
    pub source_name: String,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    #[builder(default)]
    #[serde(default)]
    pub permalink: String,
    #[builder(default)]
    #[serde(default)]
    pub author: Author,
    pub platform: String,
    #[builder(default)]
    #[serde(default)]
    pub sentiment: Sentiment,
    #[builder(default)]
    #[serde(default)]
    pub metrics: EventMetrics,
    #[builder(default)]
    #[serde(default)]
    pub keywords: Vec<String>,
    #[builder(default)]
    #[serde(default)]
    pub mentioned_entities: Vec<String>,
    #[builder(default = "en".to_string())]
    #[serde(default = "default_language")]
    pub language: String,
    #[builder(default, setter(strip_option))]
    pub location: Option<String>,
    #[builder(default, setter(strip_option))]
    pub influence_score: Option<f64>,
    #[builder(default)]
    #[serde(default)]
    pub is_duplicate: bool,
    #[builder(default, setter(strip_option))]
    pub duplicate_of_id: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

impl MonitoringEvent {
    /// The text the dedup layer compares: title, body, and author name.
    pub fn similarity_text(&self) -> String {
        format!("{} {} {}", self.title, self.body, self.author.name)
    }

    /// Content hash over the similarity text, for the exact-duplicate
    /// fast path.
    pub fn content_hash(&self) -> String {
        content_hash(&self.similarity_text())
    }

    /// Record the dedup decision. Set once at ingestion time; an event can
    /// never be a duplicate of itself.
    pub fn mark_duplicate_of(&mut self, original_id: &str) {
        debug_assert_ne!(self.id, original_id);
        if self.id == original_id {
            return;
        }
        self.is_duplicate = true;
        self.duplicate_of_id = Some(original_id.to_string());
    }

    /// Whether this event alone crosses the crisis-like visibility bar,
    /// independent of any rule firing.
    pub fn is_crisis_like(&self, reach_threshold: u64, sentiment_threshold: f64) -> bool {
        self.metrics.reach > reach_threshold || self.sentiment.score < sentiment_threshold
    }
}
