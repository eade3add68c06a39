//! Tunables shared by every pipeline step.

use crate::config::Config;
use crate::generation::GenerationRequest;
use crate::processing::chunking::{ChunkUnit, ChunkingSettings};

/// Character budget for the evaluation context block.
pub const EVALUATION_CONTEXT_CHARS: usize = 1800;
/// Largest `top_k` a request may ask for.
pub const MAX_TOP_K: usize = 20;
/// Largest per-section quiz size a request may ask for.
pub const MAX_QUIZ_QUESTIONS: usize = 10;

/// Pipeline settings derived from [`Config`].
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Chunk boundaries.
    pub chunking: ChunkingSettings,
    /// Default number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Character budget for answer prompts.
    pub answer_context_chars: usize,
    /// Character budget for evaluation prompts.
    pub evaluation_context_chars: usize,
    /// Word cap for summaries.
    pub summary_max_words: usize,
    /// Character cap on section text fed to the summarizer.
    pub summary_input_chars: usize,
    /// Default questions per quiz unit.
    pub quiz_question_count: usize,
    /// Maximum quiz units per request.
    pub quiz_max_sections: usize,
    /// Character cap on quiz unit text.
    pub quiz_context_chars: usize,
    /// Upper bound on generated tokens.
    pub generation_max_tokens: usize,
    /// Sampling temperature.
    pub generation_temperature: f32,
    /// Generation calls in flight per request.
    pub generation_concurrency: usize,
}

impl PipelineSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: config.chunking_settings(),
            retrieval_top_k: config.retrieval_top_k,
            answer_context_chars: config.answer_context_chars,
            evaluation_context_chars: EVALUATION_CONTEXT_CHARS,
            summary_max_words: config.summary_max_words,
            summary_input_chars: config.summary_input_chars,
            quiz_question_count: config.quiz_question_count,
            quiz_max_sections: config.quiz_max_sections,
            quiz_context_chars: config.quiz_context_chars,
            generation_max_tokens: config.generation_max_tokens,
            generation_temperature: config.generation_temperature,
            generation_concurrency: config.generation_concurrency,
        }
    }

    /// Build a completion request for `prompt` with the configured sampling settings.
    pub fn generation_request(&self, prompt: String) -> GenerationRequest {
        GenerationRequest {
            prompt,
            max_tokens: self.generation_max_tokens,
            temperature: self.generation_temperature,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingSettings {
                chunk_size: 600,
                overlap: 100,
                unit: ChunkUnit::Characters,
                tokenizer_model: String::new(),
            },
            retrieval_top_k: 5,
            answer_context_chars: 2000,
            evaluation_context_chars: EVALUATION_CONTEXT_CHARS,
            summary_max_words: 150,
            summary_input_chars: 2000,
            quiz_question_count: 3,
            quiz_max_sections: 8,
            quiz_context_chars: 1200,
            generation_max_tokens: 512,
            generation_temperature: 0.3,
            generation_concurrency: 4,
        }
    }
}
