//! Semantic similarity index for blog posts.
//!
//! Encodes every post into a dense vector and computes, for each post, its
//! top-K most similar posts by cosine similarity.
//!
//! # Architecture
//!
//! - `embeddings`: `Embedder` contract and the local fastembed backend
//! - `remote`: OpenAI embeddings backend
//! - `preprocess`: Text composition and truncation
//! - `encoder`: Batched, parallel encoding in corpus order
//! - `index`: Vector set, cosine similarity and top-K neighbor lists
//! - `storage`: JSON artifacts (vector dump, neighbor index, manifest)
//! - `pipeline`: End-to-end build

pub mod embeddings;
mod encoder;
mod index;
mod pipeline;
mod preprocess;
mod remote;
mod storage;

pub use encoder::{Parallelism, DEFAULT_BATCH_SIZE};
pub use index::{NeighborList, DEFAULT_NEIGHBORS};
pub use pipeline::{create_embedder, IndexPipeline};
pub use preprocess::{compose_text, DEFAULT_MAX_CHARS};
pub use storage::{ArtifactStorage, DEFAULT_SCORE_PRECISION, DEFAULT_VECTOR_PRECISION};

#[cfg(test)]
pub use embeddings::{Embedder, EmbeddingError, EmbeddingModel};
#[cfg(test)]
pub use encoder::{Encoder, EncoderError, EncoderOptions};
#[cfg(test)]
pub use index::NeighborEntry;
#[cfg(test)]
pub use pipeline::BuildError;
#[cfg(test)]
pub use storage::{EMBEDDINGS_FILE, MANIFEST_FILE, NEIGHBORS_FILE};
