//! Generative model clients used for summaries, quiz questions, answers, and evaluations.
//!
//! Two backends are supported: hosted OpenAI-compatible chat completions (the default, pointed
//! at the Hugging Face router) and a local Ollama runtime. Both apply the configured request
//! timeout and report failures with a transient/permanent classification; callers never retry.

mod ollama;
mod openai;

use crate::config::{Config, GenerationProvider};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use ollama::OllamaGenerationClient;
pub use openai::OpenAiGenerationClient;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Errors surfaced while calling a generative model.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Client could not be constructed from the supplied settings.
    #[error("Invalid generation client configuration: {0}")]
    InvalidConfiguration(String),
    /// Provider could not be reached.
    #[error("Generation provider unavailable: {0}")]
    Unavailable(String),
    /// Provider did not answer within the request timeout.
    #[error("Generation request timed out")]
    Timeout,
    /// Provider answered with a non-success status.
    #[error("Generation provider returned {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider answered with blank text.
    #[error("Provider returned an empty completion")]
    EmptyResponse,
}

impl GenerationClientError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidConfiguration(_) | Self::InvalidResponse(_) | Self::EmptyResponse => {
                false
            }
        }
    }

    /// Whether the provider timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Single completion request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Fully rendered prompt.
    pub prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Interface implemented by generative model providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate a completion for the prompt. Blank completions are an error.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError>;

    /// Model identifier reported in health output.
    fn model(&self) -> &str;
}

/// Build a generation client based on configuration.
pub fn get_generation_client(
    config: &Config,
) -> Result<Arc<dyn GenerationClient>, GenerationClientError> {
    match config.generation_provider {
        GenerationProvider::OpenAI => Ok(Arc::new(OpenAiGenerationClient::new(
            &config.api_token,
            &config.provider_base_url,
            &config.generation_model,
            config.request_timeout(),
        )?)),
        GenerationProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Ok(Arc::new(OllamaGenerationClient::new(
                base_url,
                &config.generation_model,
                config.request_timeout(),
            )?))
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> GenerationClientError {
    if error.is_timeout() {
        GenerationClientError::Timeout
    } else {
        GenerationClientError::Unavailable(error.to_string())
    }
}

fn non_empty(text: &str) -> Result<String, GenerationClientError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(GenerationClientError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_follows_status() {
        assert!(GenerationClientError::Timeout.is_transient());
        assert!(GenerationClientError::Unavailable("refused".into()).is_transient());
        assert!(
            GenerationClientError::Rejected {
                status: 502,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !GenerationClientError::Rejected {
                status: 400,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!GenerationClientError::EmptyResponse.is_transient());
    }

    #[test]
    fn blank_completions_are_errors() {
        assert!(matches!(
            non_empty("  \n"),
            Err(GenerationClientError::EmptyResponse)
        ));
        assert_eq!(non_empty(" ok ").expect("text"), "ok");
    }
}
