mod pipeline;

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::semantic::{Embedder, EmbeddingError};

/// Deterministic bag-of-words embedder for tests.
///
/// Every whitespace-separated token adds 1.0 to a hashed bucket, so texts
/// sharing words end up close to each other.
pub struct StubEmbedder {
    dimensions: usize,
    fail_on: Option<String>,
    nan_on: Option<String>,
    drop_last: bool,
}

impl StubEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail_on: None,
            nan_on: None,
            drop_last: false,
        }
    }

    /// Fail any batch containing a text with `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Emit a NaN component for texts containing `needle`.
    pub fn nan_on(mut self, needle: &str) -> Self {
        self.nan_on = Some(needle.to_string());
        self
    }

    /// Return one vector too few per batch.
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        for token in text.split_whitespace() {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }

        if let Some(needle) = &self.nan_on {
            if text.contains(needle.as_str()) {
                vector[0] = f32::NAN;
            }
        }
        vector
    }
}

impl Embedder for StubEmbedder {
    fn name(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if let Some(needle) = &self.fail_on {
            if texts.iter().any(|t| t.contains(needle.as_str())) {
                return Err(EmbeddingError::EmbeddingFailed(format!("refusing '{}'", needle)));
            }
        }

        let mut vectors: Vec<Vec<f32>> = texts.iter().map(|t| self.embed_one(t)).collect();
        if self.drop_last {
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// Embedder returning preset vectors keyed by exact text.
pub struct FixedEmbedder {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            dimensions: entries.first().map(|(_, v)| v.len()).unwrap_or(0),
            vectors: entries
                .iter()
                .map(|(text, v)| (text.to_string(), v.clone()))
                .collect(),
        }
    }
}

impl Embedder for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t)
                    .cloned()
                    .ok_or_else(|| EmbeddingError::EmbeddingFailed(format!("no vector for '{}'", t)))
            })
            .collect()
    }
}
