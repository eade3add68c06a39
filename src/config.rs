use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::processing::chunking::{ChunkUnit, ChunkingSettings};
use crate::processing::settings::{MAX_QUIZ_QUESTIONS, MAX_TOP_K};

const DEFAULT_PROVIDER_BASE_URL: &str = "https://router.huggingface.co/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
const DEFAULT_GENERATION_MODEL: &str = "mistralai/Devstral-Small-2507";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the DocQuest server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Secret token for the hosted model provider (`PROVIDER_API_TOKEN`, alias `HF_TOKEN`).
    pub api_token: String,
    /// Base URL of the OpenAI-compatible provider API.
    pub provider_base_url: String,
    /// Embedding backend used to vectorize chunks and questions.
    pub embedding_provider: EmbeddingProvider,
    /// Base URL for embedding calls (defaults to `provider_base_url`).
    pub embedding_base_url: String,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Maximum number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Generative backend used for summaries, quizzes, and answers.
    pub generation_provider: GenerationProvider,
    /// Generative model identifier.
    pub generation_model: String,
    /// Sampling temperature forwarded to the generative model.
    pub generation_temperature: f32,
    /// Upper bound on generated tokens per call.
    pub generation_max_tokens: usize,
    /// Maximum number of generation calls in flight for one request.
    pub generation_concurrency: usize,
    /// Optional Ollama base URL used when `generation_provider` is `ollama`.
    pub ollama_url: Option<String>,
    /// Timeout applied to every outbound model call.
    pub request_timeout_secs: u64,
    /// Chunk bound, measured in `text_splitter_unit`.
    pub text_splitter_chunk_size: usize,
    /// Overlap carried between adjacent chunks, measured in `text_splitter_unit`.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_unit: ChunkUnit,
    /// Default number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Character budget for the context block of answer prompts.
    pub answer_context_chars: usize,
    /// Word budget for generated summaries.
    pub summary_max_words: usize,
    /// Character cap on section text fed to the summarizer.
    pub summary_input_chars: usize,
    /// Default number of quiz questions per section.
    pub quiz_question_count: usize,
    /// Maximum number of sections used for quiz generation.
    pub quiz_max_sections: usize,
    /// Character cap on section text fed to the quiz generator.
    pub quiz_context_chars: usize,
    /// Number of processed documents kept addressable in memory.
    pub document_retention: usize,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
    /// Optional JSON file overriding the built-in prompt templates.
    pub prompt_templates_path: Option<PathBuf>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
    /// Deterministic local byte-hash embeddings (offline use and tests).
    Hashed,
}

/// Supported generative backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Hosted OpenAI-compatible `/chat/completions` endpoint.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_token = optional("PROVIDER_API_TOKEN")
            .or_else(|| optional("HF_TOKEN"))
            .ok_or_else(|| ConfigError::MissingVariable("PROVIDER_API_TOKEN".to_string()))?;
        let provider_base_url = optional("PROVIDER_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PROVIDER_BASE_URL.to_string());

        let embedding_provider = match optional("EMBEDDING_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?,
            None => EmbeddingProvider::OpenAI,
        };
        let generation_provider = match optional("GENERATION_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("GENERATION_PROVIDER".to_string()))?,
            None => GenerationProvider::OpenAI,
        };
        let text_splitter_unit = match optional("TEXT_SPLITTER_UNIT") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("TEXT_SPLITTER_UNIT".to_string()))?,
            None => ChunkUnit::Characters,
        };

        let config = Self {
            embedding_base_url: optional("EMBEDDING_BASE_URL")
                .unwrap_or_else(|| provider_base_url.clone()),
            api_token,
            provider_base_url,
            embedding_provider,
            embedding_model: optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: parse_or(&optional, "EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?,
            embedding_batch_size: parse_or(&optional, "EMBEDDING_BATCH_SIZE", 32)?,
            generation_provider,
            generation_model: optional("GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            generation_temperature: parse_or(&optional, "GENERATION_TEMPERATURE", 0.3)?,
            generation_max_tokens: parse_or(&optional, "GENERATION_MAX_TOKENS", 512)?,
            generation_concurrency: parse_or(&optional, "GENERATION_CONCURRENCY", 4)?,
            ollama_url: optional("OLLAMA_URL"),
            request_timeout_secs: parse_or(&optional, "REQUEST_TIMEOUT_SECS", 60)?,
            text_splitter_chunk_size: parse_or(&optional, "TEXT_SPLITTER_CHUNK_SIZE", 600)?,
            text_splitter_chunk_overlap: parse_or(&optional, "TEXT_SPLITTER_CHUNK_OVERLAP", 100)?,
            text_splitter_unit,
            retrieval_top_k: parse_or(&optional, "RETRIEVAL_TOP_K", 5)?,
            answer_context_chars: parse_or(&optional, "ANSWER_CONTEXT_CHARS", 2000)?,
            summary_max_words: parse_or(&optional, "SUMMARY_MAX_WORDS", 150)?,
            summary_input_chars: parse_or(&optional, "SUMMARY_INPUT_CHARS", 2000)?,
            quiz_question_count: parse_or(&optional, "QUIZ_QUESTION_COUNT", 3)?,
            quiz_max_sections: parse_or(&optional, "QUIZ_MAX_SECTIONS", 8)?,
            quiz_context_chars: parse_or(&optional, "QUIZ_CONTEXT_CHARS", 1200)?,
            document_retention: parse_or(&optional, "DOCUMENT_RETENTION", 4)?,
            max_upload_bytes: parse_or(&optional, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
            prompt_templates_path: optional("PROMPT_TEMPLATES_PATH").map(PathBuf::from),
            server_port: optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("EMBEDDING_DIMENSION", self.embedding_dimension),
            ("EMBEDDING_BATCH_SIZE", self.embedding_batch_size),
            ("GENERATION_CONCURRENCY", self.generation_concurrency),
            ("TEXT_SPLITTER_CHUNK_SIZE", self.text_splitter_chunk_size),
            ("RETRIEVAL_TOP_K", self.retrieval_top_k),
            ("DOCUMENT_RETENTION", self.document_retention),
            ("MAX_UPLOAD_BYTES", self.max_upload_bytes),
            ("SUMMARY_MAX_WORDS", self.summary_max_words),
            ("QUIZ_QUESTION_COUNT", self.quiz_question_count),
            ("QUIZ_MAX_SECTIONS", self.quiz_max_sections),
            ("QUIZ_CONTEXT_CHARS", self.quiz_context_chars),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }
        let bounded = [
            ("RETRIEVAL_TOP_K", self.retrieval_top_k, MAX_TOP_K),
            ("QUIZ_QUESTION_COUNT", self.quiz_question_count, MAX_QUIZ_QUESTIONS),
        ];
        for (key, value, max) in bounded {
            if value > max {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".to_string()));
        }
        Ok(())
    }

    /// Timeout applied to outbound model calls.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Chunker settings derived from the text splitter variables.
    pub fn chunking_settings(&self) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size: self.text_splitter_chunk_size,
            overlap: self.text_splitter_chunk_overlap,
            unit: self.text_splitter_unit,
            tokenizer_model: self.generation_model.clone(),
        }
    }
}

fn parse_or<T, F>(optional: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for GenerationProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
///
/// A missing provider token is fatal here, at startup, rather than on the first request.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider_base_url = %config.provider_base_url,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_provider = ?config.generation_provider,
        generation_model = %config.generation_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
