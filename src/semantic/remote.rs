use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::{Embedder, EmbeddingError};

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const API_KEY_VAR: &str = "OPENAI_API_KEY";

/// Known output sizes of the OpenAI embedding models.
fn known_dimensions(model: &str) -> Option<usize> {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Remote embedder backed by the OpenAI embeddings endpoint.
///
/// Requests are blocking and are not retried; a failed request fails the
/// batch it belongs to.
pub struct OpenAiEmbedder {
    client: reqwest::blocking::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    /// Build an embedder reading the API key from `OPENAI_API_KEY`.
    pub fn from_env(model: &str) -> Result<Self, EmbeddingError> {
        let api_key = match std::env::var(API_KEY_VAR) {
            Ok(key) if !key.is_empty() => key,
            _ => return Err(EmbeddingError::MissingCredentials(API_KEY_VAR)),
        };
        Self::new(model, api_key, OPENAI_EMBEDDINGS_URL)
    }

    pub fn new(model: &str, api_key: String, endpoint: &str) -> Result<Self, EmbeddingError> {
        let dimensions = known_dimensions(model).ok_or_else(|| {
            EmbeddingError::InvalidModel(format!(
                "Unknown remote model: {}. Supported models: text-embedding-3-small, text-embedding-3-large, text-embedding-ada-002",
                model
            ))
        })?;

        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            dimensions,
        })
    }
}

impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            log::warn!("openai embeddings error: status={status} body={body}");
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "OpenAI API error: {} - {}",
                status, body
            )));
        }

        let mut parsed = resp
            .json::<EmbeddingResponse>()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        // the API documents `index` as the position in the request
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
