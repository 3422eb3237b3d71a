//! Embedding backends.
//!
//! The corpus index and incoming questions must be embedded by the *same*
//! model or similarity scores are meaningless, so the backend is fixed per
//! deployment and carried by the [`crate::corpus::CorpusStore`].
//!
//! [`OpenAiEmbedder`] speaks the OpenAI `/embeddings` wire format, which is
//! also what Ollama, LM Studio and vLLM expose, so pointing
//! `embedding_base_url` at a local server is enough for fully-local setups.

use crate::error::PaperQaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Produces one vector per input text. Implementations must be deterministic
/// for a given input within a deployment.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Model identifier, for logging and store metadata.
    fn model(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, PaperQaError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible embeddings endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Create a new embedder.
    ///
    /// # Errors
    /// [`PaperQaError::InvalidConfig`] when the API key is empty.
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> Result<Self, PaperQaError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(PaperQaError::InvalidConfig(
                "embeddings API key must not be empty".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(PaperQaError::storage)?;
        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, PaperQaError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaperQaError::storage(format!("embeddings request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaperQaError::storage(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| PaperQaError::storage(format!("invalid embeddings response: {e}")))?;

        // The API does not guarantee response order; `index` does.
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != inputs.len() {
            return Err(PaperQaError::storage(format!(
                "embeddings endpoint returned {} vectors for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_rejected() {
        let result = OpenAiEmbedder::new("", "https://api.openai.com/v1", "text-embedding-3-small");
        assert!(matches!(result, Err(PaperQaError::InvalidConfig(_))));
        let result = OpenAiEmbedder::new("   ", "https://api.openai.com/v1", "m");
        assert!(result.is_err());
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let embedder =
            OpenAiEmbedder::new("sk-test", "http://localhost:11434/v1/", "nomic-embed-text")
                .unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:11434/v1/embeddings");
        assert_eq!(embedder.model(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let embedder = OpenAiEmbedder::new("sk-test", "http://localhost:1", "m").unwrap();
        // No network call is made for an empty batch, so the bogus endpoint
        // never matters.
        let vectors = embedder.embed(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
