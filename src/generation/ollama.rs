//! Local Ollama runtime client (`/api/generate`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{
    GenerationClient, GenerationClientError, GenerationRequest, map_transport_error, non_empty,
};

/// Client issuing completion requests directly to an Ollama runtime.
pub struct OllamaGenerationClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerationClient {
    /// Build a client for the runtime at `base_url`.
    pub fn new(
        base_url: String,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationClientError> {
        let http = Client::builder()
            .user_agent("docquest/generate")
            .timeout(timeout)
            .build()
            .map_err(|error| GenerationClientError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            http,
            base_url,
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;

        if !body.done {
            return Err(GenerationClientError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        non_empty(&body.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
