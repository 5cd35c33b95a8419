use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::semantic::{
    Parallelism, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CHARS, DEFAULT_NEIGHBORS,
    DEFAULT_SCORE_PRECISION, DEFAULT_VECTOR_PRECISION,
};

const CONFIG_FILE: &str = "config.yaml";

/// Default local model; multilingual because the corpus is mostly Korean.
const DEFAULT_MODEL: &str = "paraphrase-multilingual-minilm-l12-v2";
/// Default remote model
const DEFAULT_REMOTE_MODEL: &str = "text-embedding-3-small";
const DEFAULT_OUTPUT_DIR: &str = "public/data";
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Values beyond this are noise in a JSON dump of f32s
const MAX_PRECISION: u32 = 9;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("io error on {path}: {source}")]
    IO {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Which embedding backend encodes the corpus.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local fastembed model
    #[default]
    Local,
    /// OpenAI embeddings API (needs OPENAI_API_KEY)
    Openai,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,

    /// Local model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Remote model name, used when backend is `openai`
    #[serde(default = "default_remote_model")]
    pub remote_model: String,

    /// Texts per backend call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Characters kept per document before encoding
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Batch parallelism: "auto" or a positive integer
    #[serde(default = "default_parallelism")]
    pub parallelism: String,

    /// Neighbors kept per document (K)
    #[serde(default = "default_neighbors")]
    pub neighbors: usize,

    #[serde(default = "default_vector_precision")]
    pub vector_precision: u32,

    #[serde(default = "default_score_precision")]
    pub score_precision: u32,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Model download timeout in seconds (local backend)
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(skip_serializing, skip_deserializing)]
    pub(crate) base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            model: default_model(),
            remote_model: default_remote_model(),
            batch_size: default_batch_size(),
            max_chars: default_max_chars(),
            parallelism: default_parallelism(),
            neighbors: default_neighbors(),
            vector_precision: default_vector_precision(),
            score_precision: default_score_precision(),
            output_dir: default_output_dir(),
            download_timeout_secs: default_download_timeout_secs(),
            base_path: PathBuf::new(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_remote_model() -> String {
    DEFAULT_REMOTE_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}

fn default_parallelism() -> String {
    "auto".to_string()
}

fn default_neighbors() -> usize {
    DEFAULT_NEIGHBORS
}

fn default_vector_precision() -> u32 {
    DEFAULT_VECTOR_PRECISION
}

fn default_score_precision() -> u32 {
    DEFAULT_SCORE_PRECISION
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

/// `$POSTLINK_BASE_PATH`, or `~/.local/share/postlink`.
pub fn base_path() -> PathBuf {
    if let Ok(path) = std::env::var("POSTLINK_BASE_PATH") {
        return PathBuf::from(path);
    }

    match homedir::my_home() {
        Ok(Some(home)) => home.join(".local/share/postlink"),
        _ => PathBuf::from(".postlink"),
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch_size", "must be greater than 0"));
        }
        if self.max_chars == 0 {
            return Err(ConfigError::invalid("max_chars", "must be greater than 0"));
        }
        if self.neighbors == 0 {
            return Err(ConfigError::invalid("neighbors", "must be greater than 0"));
        }
        if self.vector_precision > MAX_PRECISION {
            return Err(ConfigError::invalid(
                "vector_precision",
                format!("must be at most {}, got {}", MAX_PRECISION, self.vector_precision),
            ));
        }
        if self.score_precision > MAX_PRECISION {
            return Err(ConfigError::invalid(
                "score_precision",
                format!("must be at most {}, got {}", MAX_PRECISION, self.score_precision),
            ));
        }
        if self.download_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "download_timeout_secs",
                "must be greater than 0",
            ));
        }
        self.parallelism()?;

        let model = match self.backend {
            Backend::Local => &self.model,
            Backend::Openai => &self.remote_model,
        };
        if model.trim().is_empty() {
            return Err(ConfigError::invalid("model", "must not be empty"));
        }

        Ok(())
    }

    pub fn parallelism(&self) -> Result<Parallelism, ConfigError> {
        self.parallelism
            .parse()
            .map_err(|message| ConfigError::invalid("parallelism", message))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Load `config.yaml` from `base_path`, writing defaults if it is missing.
    ///
    /// Not validated here: command line overrides apply first, then the
    /// caller runs `validate`.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path).map_err(|source| ConfigError::IO {
                path: base_path.to_path_buf(),
                source,
            })?;
            let defaults = serde_yml::to_string(&Self::default())?;
            std::fs::write(&path, defaults).map_err(|source| ConfigError::IO {
                path: path.clone(),
                source,
            })?;
            log::info!("Created default config at {}", path.display());
        }

        let config_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::IO {
            path: path.clone(),
            source,
        })?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&base_path())
    }

    /// Directory holding config.yaml and the model cache.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
