//! Index build pipeline.
//!
//! Coordinates the full build: documents → encoder → vectors → neighbor
//! lists → artifacts. The build is all-or-nothing: artifacts are written only
//! after every vector and neighbor list has been computed.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{Backend, Config};
use crate::corpus::Document;
use crate::semantic::embeddings::{Embedder, EmbeddingError, EmbeddingModel};
use crate::semantic::encoder::{Encoder, EncoderError, EncoderOptions};
use crate::semantic::index::{IndexError, NeighborIndex, VectorIndex};
use crate::semantic::remote::OpenAiEmbedder;
use crate::semantic::storage::{ArtifactPaths, ArtifactStorage, Manifest, StorageError};

/// Errors that can occur while building an index.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corpus is empty; nothing to index")]
    EmptyCorpus,

    #[error("Document '{0}' has no text to embed")]
    EmptyDocument(String),

    #[error("Embedding backend unavailable: {0}")]
    Backend(#[from] EmbeddingError),

    #[error("Encoding error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Construct the embedding backend named by the config.
///
/// Loading (and, for local models, downloading) happens here, before any
/// document is touched.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>, BuildError> {
    let embedder: Arc<dyn Embedder> = match config.backend {
        Backend::Local => {
            log::info!("Initializing local embedding model '{}'", config.model);
            Arc::new(EmbeddingModel::new(
                &config.model,
                config.base_path().to_path_buf(),
                Some(config.download_timeout()),
            )?)
        }
        Backend::Openai => {
            log::info!("Using OpenAI embedding model '{}'", config.remote_model);
            Arc::new(OpenAiEmbedder::from_env(&config.remote_model)?)
        }
    };
    Ok(embedder)
}

/// Result of a computed (not yet persisted) build.
pub struct BuiltIndex {
    pub vectors: VectorIndex,
    pub neighbors: NeighborIndex,
}

/// Summary of a persisted build.
#[derive(Debug)]
pub struct BuildReport {
    pub documents: usize,
    pub dimensions: usize,
    pub neighbors: usize,
    pub paths: ArtifactPaths,
    pub elapsed: Duration,
}

pub struct IndexPipeline {
    encoder: Encoder,
    neighbors: usize,
    storage: ArtifactStorage,
    show_progress: bool,
}

impl IndexPipeline {
    pub fn new(encoder: Encoder, neighbors: usize, storage: ArtifactStorage) -> Result<Self, BuildError> {
        if neighbors == 0 {
            return Err(BuildError::Configuration(
                "neighbor count must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            encoder,
            neighbors,
            storage,
            show_progress: false,
        })
    }

    /// Wire a pipeline from config around an already constructed embedder.
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self, BuildError> {
        config
            .validate()
            .map_err(|e| BuildError::Configuration(e.to_string()))?;

        let parallelism = config
            .parallelism()
            .map_err(|e| BuildError::Configuration(e.to_string()))?;
        let options = EncoderOptions {
            batch_size: config.batch_size,
            max_chars: config.max_chars,
            parallelism,
        };

        let storage = ArtifactStorage::new(config.output_dir.clone())
            .with_precision(config.vector_precision, config.score_precision);

        Self::new(Encoder::new(embedder, options)?, config.neighbors, storage)
    }

    /// Show a progress bar while encoding (only when stderr is a terminal).
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn output_dir(&self) -> PathBuf {
        self.storage.dir().to_path_buf()
    }

    /// Encode and rank `documents` without writing anything.
    pub fn build(&self, documents: &[Document]) -> Result<BuiltIndex, BuildError> {
        if documents.is_empty() {
            return Err(BuildError::EmptyCorpus);
        }

        let _span = tracing::info_span!("build", documents = documents.len()).entered();

        let texts = documents
            .iter()
            .map(|doc| doc.text().ok_or_else(|| BuildError::EmptyDocument(doc.id.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let progress = self.progress_bar(texts.len() as u64);
        let vectors = self.encoder.encode_with_progress(&texts, &progress);
        progress.finish_and_clear();
        let vectors = vectors?;

        let ids = documents.iter().map(|doc| doc.id.clone()).collect();
        let vectors = VectorIndex::from_parts(self.encoder.dimensions(), ids, vectors)?;
        let neighbors = vectors.build_neighbors(self.neighbors)?;

        Ok(BuiltIndex { vectors, neighbors })
    }

    /// Build the index and persist all artifacts.
    pub fn run(&self, documents: &[Document]) -> Result<BuildReport, BuildError> {
        let started = Instant::now();

        let built = self.build(documents)?;
        let manifest = Manifest::new(
            self.encoder.model_name(),
            &built.vectors,
            &built.neighbors,
            &self.storage,
        );
        let paths = self.storage.save(&built.vectors, &built.neighbors, &manifest)?;

        let report = BuildReport {
            documents: built.vectors.len(),
            dimensions: built.vectors.dimensions(),
            neighbors: self.neighbors,
            paths,
            elapsed: started.elapsed(),
        };
        log::info!(
            "Indexed {} documents ({} dimensions, top-{}) in {:.1?}",
            report.documents,
            report.dimensions,
            report.neighbors,
            report.elapsed
        );
        Ok(report)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress || !std::io::stderr().is_terminal() {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("encoding");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}
