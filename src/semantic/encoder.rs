//! Batched, parallel text encoder.
//!
//! Splits the corpus into fixed-size batches, embeds them on a rayon pool and
//! reassembles the vectors in input order. Batch boundaries never affect the
//! result: the output is the same for any batch size.

use std::sync::Arc;

use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::semantic::embeddings::{Embedder, EmbeddingError};
use crate::semantic::preprocess::{truncate_chars, DEFAULT_MAX_CHARS};

/// Default number of texts per backend call.
pub const DEFAULT_BATCH_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("Encoder configuration error: {0}")]
    Configuration(String),

    #[error("Batch starting at document {offset} failed: {source}")]
    Batch {
        offset: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("Batch starting at document {offset} returned {got} vectors for {expected} texts")]
    CountMismatch {
        offset: usize,
        expected: usize,
        got: usize,
    },

    #[error("Vector for document {position} has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        position: usize,
        expected: usize,
        got: usize,
    },

    #[error("Vector for document {position} contains a non-finite value")]
    NonFinite { position: usize },
}

/// Worker count for batch encoding: "auto" uses rayon's global pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Auto,
    Threads(usize),
}

impl std::str::FromStr for Parallelism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Parallelism::Auto);
        }
        match s.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!(
                "parallelism must be 'auto' or a positive integer, got '{}'",
                s
            )),
            Ok(n) => Ok(Parallelism::Threads(n)),
        }
    }
}

/// Encoder settings.
#[derive(Clone, Debug)]
pub struct EncoderOptions {
    pub batch_size: usize,
    pub max_chars: usize,
    pub parallelism: Parallelism,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
            parallelism: Parallelism::Auto,
        }
    }
}

/// Maps document texts to vectors through an injected `Embedder`.
pub struct Encoder {
    embedder: Arc<dyn Embedder>,
    options: EncoderOptions,
    pool: Option<rayon::ThreadPool>,
}

impl Encoder {
    /// Create an encoder, validating the backend and options up front so a
    /// misconfiguration is reported before any batch runs.
    pub fn new(embedder: Arc<dyn Embedder>, options: EncoderOptions) -> Result<Self, EncoderError> {
        if options.batch_size == 0 {
            return Err(EncoderError::Configuration(
                "batch size must be greater than 0".to_string(),
            ));
        }
        if embedder.dimensions() == 0 {
            return Err(EncoderError::Configuration(format!(
                "embedding backend '{}' reports zero dimensions",
                embedder.name()
            )));
        }

        let pool = match options.parallelism {
            Parallelism::Auto => None,
            Parallelism::Threads(n) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| EncoderError::Configuration(e.to_string()))?,
            ),
        };

        Ok(Self {
            embedder,
            options,
            pool,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    #[cfg(test)]
    pub fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        self.encode_with_progress(texts, &ProgressBar::hidden())
    }

    /// Encode `texts`, returning one vector per text in the same order and
    /// advancing `progress` by one per encoded document.
    ///
    /// Any failing batch aborts the whole encode; no partial output is
    /// returned.
    pub fn encode_with_progress(
        &self,
        texts: &[String],
        progress: &ProgressBar,
    ) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        log::info!(
            "Encoding {} documents in batches of {} with '{}'",
            texts.len(),
            self.options.batch_size,
            self.embedder.name()
        );

        let run = || -> Result<Vec<Vec<Vec<f32>>>, EncoderError> {
            texts
                .par_chunks(self.options.batch_size)
                .enumerate()
                .map(|(batch_idx, batch)| -> Result<Vec<Vec<f32>>, EncoderError> {
                    let vectors = self.encode_batch(batch_idx * self.options.batch_size, batch)?;
                    progress.inc(batch.len() as u64);
                    Ok(vectors)
                })
                .collect()
        };

        let batches = match &self.pool {
            Some(pool) => pool.install(run)?,
            None => run()?,
        };

        Ok(batches.into_iter().flatten().collect())
    }

    fn encode_batch(&self, offset: usize, batch: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        let inputs: Vec<String> = batch
            .iter()
            .map(|text| truncate_chars(text, self.options.max_chars).to_string())
            .collect();

        log::debug!("Encoding batch at offset {} ({} texts)", offset, inputs.len());

        let vectors = self
            .embedder
            .embed_batch(&inputs)
            .map_err(|source| EncoderError::Batch { offset, source })?;

        if vectors.len() != batch.len() {
            return Err(EncoderError::CountMismatch {
                offset,
                expected: batch.len(),
                got: vectors.len(),
            });
        }

        let expected = self.embedder.dimensions();
        for (i, vector) in vectors.iter().enumerate() {
            let position = offset + i;
            if vector.len() != expected {
                return Err(EncoderError::DimensionMismatch {
                    position,
                    expected,
                    got: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(EncoderError::NonFinite { position });
            }
        }

        Ok(vectors)
    }
}
