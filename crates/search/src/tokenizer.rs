//! Text tokenizer
//!
//! Tokenization for full-text indexing and the `$text` query operator:
//! - lowercase
//! - non-word characters become separators
//! - tokens of length <= 2 are dropped
//! - a fixed English stop-word set is dropped
//! - a naive suffix stripper removes `ing`, `ied`, `ies`, `ly`, `ed`, `s`
//!
//! The stripper is intentionally crude; it only fires when the remaining
//! stem keeps at least 3 characters, so "sing" stays "sing" but
//! "running" becomes "runn".

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Fixed English stop-word set
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
        "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now",
        "old", "see", "two", "way", "who", "did", "its", "let", "she", "too", "use", "this",
        "that", "with", "have", "from", "they", "will", "would", "there", "their", "what",
        "about", "which", "when", "were", "been", "than", "them", "then", "these", "some",
        "into", "more", "other", "your",
    ]
    .into_iter()
    .collect()
});

/// Suffixes stripped in order, longest first
const SUFFIXES: [&str; 6] = ["ing", "ied", "ies", "ly", "ed", "s"];

/// Minimum stem length left after stripping
const MIN_STEM: usize = 3;

fn strip_suffix(token: &str) -> &str {
    for suffix in SUFFIXES {
        if let Some(stem) = token.strip_suffix(suffix) {
            if stem.len() >= MIN_STEM {
                return stem;
            }
        }
    }
    token
}

/// Tokenize text into index terms
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 2)
        .filter(|s| !STOP_WORDS.contains(s))
        .map(|s| strip_suffix(s).to_string())
        .collect()
}

/// Tokenize and deduplicate, preserving first-seen order
///
/// Used for query processing where each distinct term contributes once.
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
