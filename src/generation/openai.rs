//! OpenAI-compatible `/chat/completions` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{
    GenerationClient, GenerationClientError, GenerationRequest, map_transport_error, non_empty,
};

const SYSTEM_PROMPT: &str = "You are a careful assistant that works only from the document text you are given. Never invent facts or references.";

/// Chat completions client for OpenAI-compatible providers.
pub struct OpenAiGenerationClient {
    http: Client,
    endpoint: String,
    model: String,
}

impl OpenAiGenerationClient {
    /// Build a client posting to `{base_url}/chat/completions` with bearer authentication.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationClientError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| {
                GenerationClientError::InvalidConfiguration("invalid provider API token".into())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = Client::builder()
            .user_agent("docquest/generate")
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| GenerationClientError::InvalidConfiguration(error.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationClientError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(GenerationClientError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|error| {
            if error.is_timeout() {
                GenerationClientError::Timeout
            } else {
                GenerationClientError::InvalidResponse(format!(
                    "failed to decode chat completion: {error}"
                ))
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .unwrap_or_default();
        non_empty(&content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
