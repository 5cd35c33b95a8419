//! In-memory vector set and all-pairs nearest-neighbor builder.
//!
//! Stores document vectors in corpus order and computes, for every document,
//! the top-K most similar other documents by cosine similarity.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default number of neighbors kept per document.
pub const DEFAULT_NEIGHBORS: usize = 10;

/// One ranked neighbor of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborEntry {
    /// Neighbor document ID
    pub id: String,
    /// Cosine similarity score (-1.0 to 1.0)
    pub score: f32,
}

/// Neighbors of one document, best first.
pub type NeighborList = Vec<NeighborEntry>;

/// Document vectors aligned to their IDs, in corpus order.
///
/// Corpus order is significant: it is the tie-break when two candidates score
/// the same.
pub struct VectorIndex {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    /// ID -> position in corpus order
    positions: HashMap<String, usize>,
    /// Expected embedding dimensions
    dimensions: usize,
}

impl VectorIndex {
    #[cfg(test)]
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            vectors: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    /// Build an index from IDs and vectors zipped by position.
    pub fn from_parts(
        dimensions: usize,
        ids: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        if ids.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                ids: ids.len(),
                vectors: vectors.len(),
            });
        }

        let mut index = Self::with_capacity(dimensions, ids.len());
        for (id, vector) in ids.into_iter().zip(vectors) {
            index.push(id, vector)?;
        }
        Ok(index)
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append a document at the end of corpus order.
    ///
    /// Zero-norm vectors are accepted; they score 0.0 against everything.
    pub fn push(&mut self, id: String, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        if self.positions.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        if l2_norm_sq(&vector) == 0.0 {
            log::warn!("Document '{}' has a zero-norm vector; its scores will all be 0", id);
        }

        self.positions.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.vectors.push(vector);
        Ok(())
    }

    #[cfg(test)]
    /// Get a document's vector by ID.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.positions.get(id).map(|&pos| self.vectors[pos].as_slice())
    }

    /// Iterate over (id, vector) in corpus order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.ids
            .iter()
            .zip(&self.vectors)
            .map(|(id, v)| (id.as_str(), v.as_slice()))
    }

    /// Rank every other document against the document at `position` and keep
    /// the best `k`.
    ///
    /// The sort is stable over candidates enumerated in corpus order, so equal
    /// scores keep corpus order. Scores are full precision.
    pub fn top_k(&self, position: usize, k: usize) -> NeighborList {
        let query = &self.vectors[position];

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != position)
            .map(|(j, candidate)| (j, cosine_similarity(query, candidate)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(j, score)| NeighborEntry {
                id: self.ids[j].clone(),
                score,
            })
            .collect()
    }

    /// Compute the top-`k` neighbor list of every document.
    ///
    /// Documents are processed in parallel; the result is collected in corpus
    /// order and does not depend on scheduling.
    pub fn build_neighbors(&self, k: usize) -> Result<NeighborIndex, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }

        if self.len() < 2 {
            // nothing to rank against
            return Ok(NeighborIndex {
                k,
                lists: self.ids.iter().map(|id| (id.clone(), Vec::new())).collect(),
            });
        }

        log::info!("Computing top-{} neighbors for {} documents", k, self.len());

        let lists = (0..self.len())
            .into_par_iter()
            .map(|i| (self.ids[i].clone(), self.top_k(i, k)))
            .collect();

        Ok(NeighborIndex { k, lists })
    }
}

/// Per-document neighbor lists, in corpus order.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborIndex {
    k: usize,
    lists: Vec<(String, NeighborList)>,
}

impl NeighborIndex {
    /// Maximum entries per list.
    pub fn k(&self) -> usize {
        self.k
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&NeighborList> {
        self.lists.iter().find(|(doc, _)| doc == id).map(|(_, list)| list)
    }

    /// Iterate over (id, neighbors) in corpus order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NeighborList)> {
        self.lists.iter().map(|(id, list)| (id.as_str(), list))
    }
}

/// Cosine similarity: dot product over the product of Euclidean norms.
///
/// A zero-norm operand yields 0.0. Accumulates in f64; `cosine_similarity(v, v)`
/// is exactly 1.0 for any non-zero `v`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    // sqrt of the product keeps v·v / sqrt(|v|²|v|²) exact
    (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0) as f32
}

fn l2_norm_sq(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum()
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Got {ids} document IDs but {vectors} vectors")]
    LengthMismatch { ids: usize, vectors: usize },

    #[error("Duplicate document ID: {0}")]
    DuplicateId(String),

    #[error("Neighbor count must be greater than 0")]
    InvalidK,
}
