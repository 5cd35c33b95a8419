//! Static JSON artifacts for a built index.
//!
//! Files written to the output directory:
//! - `embeddings.json`: `{ id: [f32; dimensions] }`, values rounded
//! - `similarity-matrix.json`: `{ id: [{ "id", "score" }] }`, scores rounded
//! - `manifest.json`: model, dimensions, counts and build time
//!
//! Maps are keyed by document ID in sorted order so identical builds produce
//! identical bytes. Every file is written to a temp file in the same directory
//! and renamed into place.

use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::semantic::embeddings::model_id_hash;
use crate::semantic::index::{NeighborEntry, NeighborIndex, NeighborList, VectorIndex};

pub const EMBEDDINGS_FILE: &str = "embeddings.json";
pub const NEIGHBORS_FILE: &str = "similarity-matrix.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Default decimal places for stored vector components.
pub const DEFAULT_VECTOR_PRECISION: u32 = 5;
/// Default decimal places for stored similarity scores.
pub const DEFAULT_SCORE_PRECISION: u32 = 4;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Build metadata stored next to the artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub model: String,
    /// Hex SHA-256 of the model name
    pub model_id: String,
    pub dimensions: usize,
    pub documents: usize,
    pub neighbors: usize,
    pub vector_precision: u32,
    pub score_precision: u32,
    pub built_at: String,
}

impl Manifest {
    pub fn new(model: &str, index: &VectorIndex, neighbors: &NeighborIndex, storage: &ArtifactStorage) -> Self {
        let model_id = model_id_hash(model)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        Self {
            model: model.to_string(),
            model_id,
            dimensions: index.dimensions(),
            documents: index.len(),
            neighbors: neighbors.k(),
            vector_precision: storage.vector_precision,
            score_precision: storage.score_precision,
            built_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Paths of a completed write.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub embeddings: PathBuf,
    pub neighbors: PathBuf,
    pub manifest: PathBuf,
}

/// Writer/reader for the artifact directory.
pub struct ArtifactStorage {
    dir: PathBuf,
    vector_precision: u32,
    score_precision: u32,
}

impl ArtifactStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            vector_precision: DEFAULT_VECTOR_PRECISION,
            score_precision: DEFAULT_SCORE_PRECISION,
        }
    }

    pub fn with_precision(mut self, vector_precision: u32, score_precision: u32) -> Self {
        self.vector_precision = vector_precision;
        self.score_precision = score_precision;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write all artifacts of a finished build.
    ///
    /// Every payload is serialized and staged in a temp file before the first
    /// artifact is replaced. If any rename fails, artifacts already swapped in
    /// are rolled back, so the directory holds either the previous build or
    /// this one.
    pub fn save(
        &self,
        index: &VectorIndex,
        neighbors: &NeighborIndex,
        manifest: &Manifest,
    ) -> Result<ArtifactPaths, StorageError> {
        let paths = ArtifactPaths {
            embeddings: self.dir.join(EMBEDDINGS_FILE),
            neighbors: self.dir.join(NEIGHBORS_FILE),
            manifest: self.dir.join(MANIFEST_FILE),
        };

        let vector_dump: BTreeMap<&str, Vec<f32>> = index
            .iter()
            .map(|(id, v)| {
                let rounded = v.iter().map(|x| round_to(*x, self.vector_precision)).collect();
                (id, rounded)
            })
            .collect();
        let neighbor_dump: BTreeMap<&str, NeighborList> = neighbors
            .iter()
            .map(|(id, list)| (id, self.rounded_list(list)))
            .collect();

        let embeddings_json = serde_json::to_vec(&vector_dump)
            .map_err(|e| StorageError::json(&paths.embeddings, e))?;
        let neighbors_json = serde_json::to_vec(&neighbor_dump)
            .map_err(|e| StorageError::json(&paths.neighbors, e))?;
        let manifest_json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| StorageError::json(&paths.manifest, e))?;

        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;

        // manifest last: its presence marks a complete build
        let staged = vec![
            (self.stage(&paths.embeddings, &embeddings_json)?, paths.embeddings.as_path()),
            (self.stage(&paths.neighbors, &neighbors_json)?, paths.neighbors.as_path()),
            (self.stage(&paths.manifest, &manifest_json)?, paths.manifest.as_path()),
        ];
        self.commit(staged)?;

        Ok(paths)
    }

    /// Read the neighbor index written by `save`.
    pub fn load_neighbors(&self) -> Result<BTreeMap<String, NeighborList>, StorageError> {
        let path = self.dir.join(NEIGHBORS_FILE);
        let bytes = std::fs::read(&path).map_err(|e| StorageError::io(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::json(&path, e))
    }

    pub fn load_manifest(&self) -> Result<Manifest, StorageError> {
        let path = self.dir.join(MANIFEST_FILE);
        let bytes = std::fs::read(&path).map_err(|e| StorageError::io(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| StorageError::json(&path, e))
    }

    /// Rounding happens here, after ranking, never before.
    fn rounded_list(&self, list: &NeighborList) -> NeighborList {
        list.iter()
            .map(|e| NeighborEntry {
                id: e.id.clone(),
                score: round_to(e.score, self.score_precision),
            })
            .collect()
    }

    /// temp file -> write -> fsync; the caller renames it into place.
    fn stage(&self, path: &Path, bytes: &[u8]) -> Result<NamedTempFile, StorageError> {
        let tmp = NamedTempFile::new_in(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;

        let mut writer = BufWriter::new(tmp);
        writer.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
        let tmp = writer
            .into_inner()
            .map_err(|e| StorageError::io(path, e.into_error()))?;
        tmp.as_file().sync_all().map_err(|e| StorageError::io(path, e))?;

        log::debug!("Staged {} ({} bytes)", path.display(), bytes.len());
        Ok(tmp)
    }

    /// Rename every staged file into place, restoring the previous artifacts
    /// if any rename fails.
    fn commit(&self, staged: Vec<(NamedTempFile, &Path)>) -> Result<(), StorageError> {
        let mut committed: Vec<(&Path, Option<PathBuf>)> = Vec::with_capacity(staged.len());

        for (tmp, path) in staged {
            let backup = match self.back_up(path) {
                Ok(backup) => backup,
                Err(e) => {
                    self.roll_back(committed);
                    return Err(e);
                }
            };

            if let Err(e) = tmp.persist(path) {
                if let Some(backup) = &backup {
                    restore(backup, path);
                }
                self.roll_back(committed);
                return Err(StorageError::io(path, e.error));
            }
            committed.push((path, backup));
        }

        for (_, backup) in committed {
            if let Some(backup) = backup {
                if let Err(e) = std::fs::remove_file(&backup) {
                    log::warn!("Failed to remove {}: {}", backup.display(), e);
                }
            }
        }
        Ok(())
    }

    /// Move an existing artifact aside; `None` when there is nothing to keep.
    fn back_up(&self, path: &Path) -> Result<Option<PathBuf>, StorageError> {
        if !path.is_file() {
            return Ok(None);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let backup = self.dir.join(format!(".{}.prev", name));
        std::fs::rename(path, &backup).map_err(|e| StorageError::io(path, e))?;
        Ok(Some(backup))
    }

    fn roll_back(&self, committed: Vec<(&Path, Option<PathBuf>)>) {
        for (path, backup) in committed.into_iter().rev() {
            match backup {
                Some(backup) => restore(&backup, path),
                None => {
                    if let Err(e) = std::fs::remove_file(path) {
                        log::warn!("Failed to remove {}: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

fn restore(backup: &Path, path: &Path) {
    if let Err(e) = std::fs::rename(backup, path) {
        log::error!(
            "Failed to restore {} from {}: {}",
            path.display(),
            backup.display(),
            e
        );
    }
}

/// Round to `places` decimal places, half away from zero.
pub fn round_to(value: f32, places: u32) -> f32 {
    let scale = 10f64.powi(places as i32);
    ((f64::from(value) * scale).round() / scale) as f32
}
