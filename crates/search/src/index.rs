//! Full-text index with TF-IDF ranking
//!
//! Posting lists map token → document id → per-field postings carrying
//! the term frequency and token positions. Scoring is classic TF-IDF:
//! `(freq / doc_len) * ln(N / df) * field_weight`, summed over query
//! tokens and indexed fields.

use crate::tokenizer::{tokenize, tokenize_unique};
use monarch_core::Document;
use std::collections::HashMap;

/// One posting: a token's occurrences in one field of one document
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    /// Field path the token occurred in
    pub field: String,
    /// Weight of that field at indexing time
    pub weight: f64,
    /// Occurrences of the token in the field
    pub frequency: usize,
    /// Token positions within the field's token stream
    pub positions: Vec<usize>,
}

/// A scored search hit
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    /// Document id
    pub id: String,
    /// TF-IDF score, higher is better
    pub score: f64,
}

/// Full-text index over one or more document fields
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    /// (field path, weight) pairs this index covers
    fields: Vec<(String, f64)>,
    /// token → doc id → postings
    postings: HashMap<String, HashMap<String, Vec<Posting>>>,
    /// doc id → total indexed tokens (for length normalisation)
    doc_lens: HashMap<String, usize>,
}

impl TextIndex {
    /// Create an index over `fields`, every field at weight 1.0
    pub fn new(fields: Vec<String>) -> Self {
        Self::with_weights(fields.into_iter().map(|f| (f, 1.0)).collect())
    }

    /// Create an index over weighted fields
    pub fn with_weights(fields: Vec<(String, f64)>) -> Self {
        Self {
            fields,
            postings: HashMap::new(),
            doc_lens: HashMap::new(),
        }
    }

    /// Field paths this index covers
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(f, _)| f.as_str())
    }

    /// Number of indexed documents
    pub fn doc_count(&self) -> usize {
        self.doc_lens.len()
    }

    /// True if the document is present in the index
    pub fn contains(&self, id: &str) -> bool {
        self.doc_lens.contains_key(id)
    }

    /// Index (or re-index) a document
    pub fn index_document(&mut self, id: &str, doc: &Document) {
        if self.contains(id) {
            self.remove_document(id);
        }
        let mut total_tokens = 0usize;
        for (field, weight) in self.fields.clone() {
            let text = match doc.get_path(&field) {
                Some(v) => match v.as_str() {
                    Some(s) => s.to_string(),
                    None => continue,
                },
                None => continue,
            };
            let tokens = tokenize(&text);
            total_tokens += tokens.len();
            let mut by_token: HashMap<&str, Vec<usize>> = HashMap::new();
            for (pos, token) in tokens.iter().enumerate() {
                by_token.entry(token).or_default().push(pos);
            }
            for (token, positions) in by_token {
                self.postings
                    .entry(token.to_string())
                    .or_default()
                    .entry(id.to_string())
                    .or_default()
                    .push(Posting {
                        field: field.clone(),
                        weight,
                        frequency: positions.len(),
                        positions,
                    });
            }
        }
        self.doc_lens.insert(id.to_string(), total_tokens);
    }

    /// Remove a document, purging its postings
    pub fn remove_document(&mut self, id: &str) {
        if self.doc_lens.remove(id).is_none() {
            return;
        }
        self.postings.retain(|_, docs| {
            docs.remove(id);
            !docs.is_empty()
        });
    }

    /// True if the document contains every token of `query`
    ///
    /// This is the predicate behind the `$text` matcher operator.
    pub fn matches(&self, id: &str, query: &str) -> bool {
        let tokens = tokenize_unique(query);
        if tokens.is_empty() {
            return false;
        }
        tokens
            .iter()
            .all(|t| self.postings.get(t).map_or(false, |docs| docs.contains_key(id)))
    }

    /// Search, returning the top `limit` hits by descending score
    ///
    /// Ties are broken by ascending document id so results are
    /// deterministic.
    pub fn search(&self, query: &str, limit: usize) -> Vec<TextMatch> {
        let n = self.doc_lens.len();
        if n == 0 {
            return Vec::new();
        }
        let mut scores: HashMap<&str, f64> = HashMap::new();
        for token in tokenize_unique(query) {
            let Some(docs) = self.postings.get(&token) else {
                continue;
            };
            let df = docs.len();
            let idf = ((n as f64) / (df as f64)).ln();
            for (doc_id, posts) in docs {
                let doc_len = *self.doc_lens.get(doc_id).unwrap_or(&1) as f64;
                let contribution: f64 = posts
                    .iter()
                    .map(|p| (p.frequency as f64 / doc_len.max(1.0)) * idf * p.weight)
                    .sum();
                *scores.entry(doc_id.as_str()).or_insert(0.0) += contribution;
            }
        }
        // A token present in every document has idf 0; such hits stay in
        // the result set with score 0 rather than vanishing.
        let mut hits: Vec<TextMatch> = scores
            .into_iter()
            .map(|(id, score)| TextMatch {
                id: id.to_string(),
                score,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }
}
