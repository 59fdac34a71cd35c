//! OpenAI-backed embedder for the ingestion pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ingestion::error::{IngestError, ProcessingError};
use ingestion::traits::{Chunk, Embedder};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        let request = EmbeddingRequest {
            input: chunks.iter().map(|chunk| chunk.text.clone()).collect(),
            model: EMBEDDING_MODEL.to_string(),
        };

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProcessingError::EmbeddingServiceDown(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProcessingError::EmbeddingQuotaExceeded.into());
        }
        if !response.status().is_success() {
            return Err(ProcessingError::EmbeddingServiceDown(format!(
                "embeddings API returned {}",
                response.status()
            ))
            .into());
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProcessingError::EmbeddingServiceDown(e.to_string()))?;

        if parsed.data.len() != chunks.len() {
            return Err(ProcessingError::Unknown(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                parsed.data.len()
            ))
            .into());
        }
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
