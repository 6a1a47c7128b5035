use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Normalize text for similarity comparison.
///
/// Normalization rules:
/// - Convert to lowercase
/// - Remove all non-alphanumeric characters (except spaces)
/// - Collapse multiple spaces into single spaces
/// - Trim leading/trailing whitespace
///
/// This makes downstream comparisons robust against minor formatting
/// differences between listening services carrying the same content.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokenize normalized text into a set of words.
pub fn token_set(text: &str) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Generate a content hash for exact-duplicate detection.
///
/// SHA256 over normalized text. Two mentions that differ only in casing,
/// punctuation, or whitespace hash identically.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(text).as_bytes());
    hex::encode(hasher.finalize())
}
