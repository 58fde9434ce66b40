//! Vector container
//!
//! Dense float vectors with metadata and top-k cosine search. The first
//! vector written to a key fixes the dimensionality; every later vector
//! must match it.
//!
//! `vsearch` scans every vector. When the collection is more than twice
//! the requested `k`, candidates go through a size-k min-heap
//! (O(n log k)); otherwise a full sort is cheaper in practice.

use monarch_core::{Document, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A stored vector with optional metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// The dense vector
    pub vector: Vec<f32>,
    /// Caller-supplied metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,
}

/// A scored search hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    /// Vector id
    pub id: String,
    /// Cosine similarity in [-1, 1]; zero-norm vectors score 0
    pub score: f32,
}

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Heap entry ordered by (score, reversed id) so the heap root is the
/// weakest candidate
#[derive(Debug, PartialEq)]
struct Candidate {
    score: f32,
    id: String,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Scores are finite (inputs are validated), so partial_cmp is total
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A keyed set of equal-dimension vectors
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VectorSet {
    dimension: Option<usize>,
    entries: BTreeMap<String, VectorEntry>,
}

impl VectorSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidArgument("vector cannot be empty".into()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidArgument(
                "vector components must be finite".into(),
            ));
        }
        if let Some(dim) = self.dimension {
            if vector.len() != dim {
                return Err(Error::InvalidArgument(format!(
                    "vector has dimension {}, set is fixed at {}",
                    vector.len(),
                    dim
                )));
            }
        }
        Ok(())
    }

    /// Add or replace a vector
    pub fn vadd(&mut self, id: impl Into<String>, vector: Vec<f32>, metadata: Option<Document>) -> Result<()> {
        self.check_vector(&vector)?;
        if self.dimension.is_none() {
            self.dimension = Some(vector.len());
        }
        self.entries.insert(id.into(), VectorEntry { vector, metadata });
        Ok(())
    }

    /// Fetch a vector by id
    pub fn vget(&self, id: &str) -> Option<&VectorEntry> {
        self.entries.get(id)
    }

    /// Delete a vector; true when it existed
    pub fn vdel(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Number of vectors
    pub fn vcount(&self) -> usize {
        self.entries.len()
    }

    /// True when the set holds nothing
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fixed dimensionality, once the first vector is in
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Top-`k` vectors by cosine similarity to `query`, scores
    /// non-increasing, ties broken by ascending id
    pub fn vsearch(&self, query: &[f32], k: usize) -> Result<Vec<VectorMatch>> {
        self.check_vector(query)?;
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let scored = self.entries.iter().map(|(id, entry)| Candidate {
            score: cosine_similarity(query, &entry.vector),
            id: id.clone(),
        });

        let mut top: Vec<Candidate> = if self.entries.len() > 2 * k {
            // Min-heap of the best k seen so far
            let mut heap = std::collections::BinaryHeap::with_capacity(k + 1);
            for candidate in scored {
                heap.push(std::cmp::Reverse(candidate));
                if heap.len() > k {
                    heap.pop();
                }
            }
            heap.into_iter().map(|r| r.0).collect()
        } else {
            scored.collect()
        };

        top.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        top.truncate(k);
        Ok(top
            .into_iter()
            .map(|c| VectorMatch {
                id: c.id,
                score: c.score,
            })
            .collect())
    }
}
