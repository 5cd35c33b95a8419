//! Corpus loading.
//!
//! Documents arrive already filtered and deduplicated by an upstream export.
//! Supported inputs:
//! - `.json`: array of `{ "id": string | integer, "title"?: string, "content": string }`
//! - `.csv`: header row with `id`, `content` and an optional `title` column

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::semantic::compose_text;

#[derive(thiserror::Error, Debug)]
pub enum CorpusError {
    #[error("corpus file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported corpus format '{0}' (expected .json or .csv)")]
    UnsupportedFormat(String),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("malformed JSON corpus: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed CSV corpus: {0}")]
    Csv(#[from] csv::Error),

    #[error("duplicate document id '{0}'")]
    DuplicateId(String),

    #[error("document with empty id at position {0}")]
    EmptyId(usize),
}

/// One input document. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

impl Document {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            content: content.into(),
        }
    }

    #[cfg(test)]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Text handed to the encoder; `None` when the body is blank.
    pub fn text(&self) -> Option<String> {
        compose_text(self.title.as_deref(), &self.content)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

/// CSV row. The id column is read as text so `007` stays `007`.
#[derive(Deserialize)]
struct CsvRow {
    id: String,
    #[serde(default)]
    title: Option<String>,
    content: String,
}

impl From<CsvRow> for Document {
    fn from(row: CsvRow) -> Self {
        Self {
            id: row.id,
            title: row.title.filter(|t| !t.is_empty()),
            content: row.content,
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Load a corpus file, picking the format from its extension.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let documents = match ext.as_str() {
        "json" => {
            let bytes = std::fs::read(path)?;
            serde_json::from_slice::<Vec<Document>>(&bytes)?
        }
        "csv" => {
            let mut reader = csv::Reader::from_path(path)?;
            reader
                .deserialize::<CsvRow>()
                .map(|row| row.map(Document::from))
                .collect::<Result<Vec<_>, _>>()?
        }
        other => return Err(CorpusError::UnsupportedFormat(other.to_string())),
    };

    let documents = validate(documents)?;
    log::info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Check IDs and drop documents with nothing to embed.
pub fn validate(documents: Vec<Document>) -> Result<Vec<Document>, CorpusError> {
    let mut seen = HashSet::with_capacity(documents.len());
    let mut kept = Vec::with_capacity(documents.len());

    for (position, doc) in documents.into_iter().enumerate() {
        if doc.id.trim().is_empty() {
            return Err(CorpusError::EmptyId(position));
        }
        if !seen.insert(doc.id.clone()) {
            return Err(CorpusError::DuplicateId(doc.id));
        }
        if doc.content.trim().is_empty() {
            log::warn!("Skipping document '{}': empty content", doc.id);
            continue;
        }
        kept.push(doc);
    }

    Ok(kept)
}
