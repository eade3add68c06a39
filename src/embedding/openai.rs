//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{EmbeddingClient, EmbeddingClientError};

/// Async embeddings client for OpenAI-compatible endpoints (OpenAI, Hugging Face router, ...).
pub struct OpenAiEmbeddingClient {
    http: Client,
    endpoint: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiEmbeddingClient {
    /// Build a client posting to `{base_url}/embeddings` with bearer authentication.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimension: usize,
        batch_size: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        if model.trim().is_empty() {
            return Err(EmbeddingClientError::InvalidConfiguration(
                "missing embedding model name".into(),
            ));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| {
                EmbeddingClientError::InvalidConfiguration("invalid provider API token".into())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .user_agent("docquest/embeddings")
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| EmbeddingClientError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        })
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                EmbeddingClientError::Timeout
            } else {
                EmbeddingClientError::InvalidResponse(format!(
                    "failed to decode embedding response: {error}"
                ))
            }
        })?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "provider returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        parsed
            .data
            .into_iter()
            .map(|entry| {
                if entry.embedding.len() == self.dimension {
                    Ok(entry.embedding)
                } else {
                    Err(EmbeddingClientError::DimensionMismatch {
                        expected: self.dimension,
                        actual: entry.embedding.len(),
                    })
                }
            })
            .collect()
    }
}

fn map_transport_error(error: reqwest::Error) -> EmbeddingClientError {
    if error.is_timeout() {
        EmbeddingClientError::Timeout
    } else {
        EmbeddingClientError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        tracing::debug!(
            model = %self.model,
            count = texts.len(),
            batch_size = self.batch_size,
            "Requesting embeddings"
        );
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    index: usize,
}
