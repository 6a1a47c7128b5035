//! Content-similarity scoring for duplicate suppression.

use std::collections::HashSet;

use crate::common::utils::token_set;
use crate::domains::monitoring::models::MonitoringEvent;

/// A candidate original for an incoming event.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
    pub id: String,
    pub score: f64,
}

/// Jaccard similarity between two token sets.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Score `event` against `candidates` and return matches above `threshold`,
/// best first. Candidates are assumed to be platform-scoped and
/// time-bounded already.
pub fn rank_similar(
    event: &MonitoringEvent,
    candidates: &[MonitoringEvent],
    threshold: f64,
) -> Vec<SimilarityMatch> {
    let tokens = token_set(&event.similarity_text());

    let mut matches: Vec<SimilarityMatch> = candidates
        .iter()
        .filter(|c| c.id != event.id)
        .map(|c| SimilarityMatch {
            id: c.id.clone(),
            score: jaccard(&tokens, &token_set(&c.similarity_text())),
        })
        .filter(|m| m.score > threshold)
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches
}
