//! Embedding backends used to vectorize chunks and questions.

mod openai;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use openai::OpenAiEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Client could not be constructed from the supplied settings.
    #[error("Invalid embedding client configuration: {0}")]
    InvalidConfiguration(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider did not answer within the request timeout.
    #[error("Embedding request timed out")]
    Timeout,
    /// Provider answered with a non-success status.
    #[error("Embedding provider returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },
    /// Provider response could not be decoded or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Returned vectors did not have the configured dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension of the returned vector.
        actual: usize,
    },
}

impl EmbeddingClientError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfiguration(_)
            | Self::InvalidResponse(_)
            | Self::DimensionMismatch { .. } => false,
        }
    }

    /// Whether the provider timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Dimension of every produced vector.
    fn dimension(&self) -> usize;

    /// Model identifier reported in document metadata.
    fn model(&self) -> &str;
}

/// Deterministic local embedding client hashing bytes into vector slots.
///
/// Needs no network access; identical texts always map to identical vectors.
pub struct HashedEmbeddingClient {
    dimension: usize,
}

impl HashedEmbeddingClient {
    /// Construct a client producing `dimension`-sized vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::InvalidConfiguration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        tracing::debug!(
            count = texts.len(),
            dimension = self.dimension,
            "Generating hashed embeddings"
        );

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        "hashed"
    }
}

/// Build an embedding client suitable for the supplied configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    match config.embedding_provider {
        EmbeddingProvider::Hashed => {
            Ok(Arc::new(HashedEmbeddingClient::new(config.embedding_dimension)))
        }
        EmbeddingProvider::OpenAI => Ok(Arc::new(OpenAiEmbeddingClient::new(
            &config.api_token,
            &config.embedding_base_url,
            &config.embedding_model,
            config.embedding_dimension,
            config.embedding_batch_size,
            config.request_timeout(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_client_is_deterministic_and_normalized() {
        let client = HashedEmbeddingClient::new(16);
        let vectors = client
            .generate_embeddings(vec!["alpha beta".into(), "alpha beta".into(), "".into()])
            .await
            .expect("embeddings");

        assert_eq!(vectors.len(), 3);
        assert_eq!(vectors[0], vectors[1]);
        assert!(vectors.iter().all(|vector| vector.len() == 16));
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(vectors[2].iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn hashed_client_rejects_zero_dimension() {
        let error = HashedEmbeddingClient::new(0)
            .generate_embeddings(vec!["text".into()])
            .await
            .unwrap_err();
        assert!(matches!(error, EmbeddingClientError::InvalidConfiguration(_)));
    }

    #[test]
    fn transient_classification_follows_status() {
        assert!(EmbeddingClientError::Timeout.is_transient());
        assert!(
            EmbeddingClientError::Rejected {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            EmbeddingClientError::Rejected {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !EmbeddingClientError::Rejected {
                status: 401,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!EmbeddingClientError::InvalidResponse("bad".into()).is_transient());
    }
}
