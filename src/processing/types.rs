//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError, extract::ExtractionError, generation::GenerationClientError,
    index::IndexError, processing::chunking::Chunk, prompts::TemplateError,
    store::{DocumentId, StoreError},
};
use anyhow::Error as TokenizerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while turning section text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Configuration asked for an impossible chunk bound.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted while processing an upload.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Upload could not be read as a supported document.
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] ExtractionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingClientError),
    /// Embeddings could not be assembled into an index.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
    /// A blocking worker task failed.
    #[error("Processing task failed: {0}")]
    Internal(String),
}

/// Errors emitted while serving quiz, question, and evaluation requests.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Request body was missing a required value or held an out-of-range one.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// No document has been processed yet.
    #[error("No document has been processed yet. Upload a document first.")]
    NoDocumentProcessed,
    /// The requested document id is unknown.
    #[error("Document {0} not found")]
    DocumentNotFound(DocumentId),
    /// The requested document was evicted from memory.
    #[error("Document {0} is no longer available; process it again")]
    IndexStale(DocumentId),
    /// No quiz unit produced a usable question.
    #[error("Quiz generation failed for every section: {message}")]
    QuizUnavailable {
        /// Last unit failure, for diagnostics.
        message: String,
        /// Whether every unit failed for a transient reason.
        transient: bool,
    },
    /// Retrieval pipeline failed at a specific stage.
    #[error(transparent)]
    Qa(#[from] QaError),
}

impl From<StoreError> for QueryError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NoDocumentProcessed => Self::NoDocumentProcessed,
            StoreError::NotFound(id) => Self::DocumentNotFound(id),
            StoreError::Stale(id) => Self::IndexStale(id),
        }
    }
}

/// Stage of the retrieval pipeline, reported on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QaStage {
    /// Embedding the question.
    EmbedQuery,
    /// Similarity search over the document index.
    Retrieve,
    /// Building the context block and rendering the prompt.
    ComposePrompt,
    /// Calling the generative model.
    Generate,
}

impl QaStage {
    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmbedQuery => "embed_query",
            Self::Retrieve => "retrieve",
            Self::ComposePrompt => "compose_prompt",
            Self::Generate => "generate",
        }
    }
}

impl fmt::Display for QaStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying cause of a retrieval pipeline failure.
#[derive(Debug, Error)]
pub enum QaFailure {
    /// Query embedding failed or had the wrong dimension.
    #[error("embedding unavailable: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index search failed.
    #[error("index search failed: {0}")]
    Index(#[from] IndexError),
    /// The index returned no chunks.
    #[error("no relevant chunks found")]
    NoRelevantChunks,
    /// Prompt could not be rendered.
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] TemplateError),
    /// Generative model call failed.
    #[error("generation unavailable: {0}")]
    Generation(#[from] GenerationClientError),
}

/// Retrieval pipeline failure tagged with the stage it occurred in.
#[derive(Debug, Error)]
#[error("failed at {stage} stage: {source}")]
pub struct QaError {
    /// Stage that failed.
    pub stage: QaStage,
    /// What went wrong.
    #[source]
    pub source: QaFailure,
}

impl QaError {
    /// Tag `failure` with `stage`.
    pub fn new(stage: QaStage, failure: impl Into<QaFailure>) -> Self {
        Self {
            stage,
            source: failure.into(),
        }
    }

    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match &self.source {
            QaFailure::Embedding(error) => error.is_transient(),
            QaFailure::Generation(error) => error.is_transient(),
            QaFailure::Index(_) | QaFailure::NoRelevantChunks | QaFailure::Prompt(_) => false,
        }
    }

    /// Whether an upstream model call timed out.
    pub fn is_timeout(&self) -> bool {
        match &self.source {
            QaFailure::Embedding(error) => error.is_timeout(),
            QaFailure::Generation(error) => error.is_timeout(),
            _ => false,
        }
    }
}

/// Uploaded file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Client-supplied filename; its extension selects the format.
    pub filename: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// How the document overview was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStrategy {
    /// Written by the generative model.
    Abstractive,
    /// Assembled from leading sentences after the model failed.
    Extractive,
}

/// Document-level overview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    /// Summary text.
    pub text: String,
    /// Strategy that produced `text`.
    pub strategy: SummaryStrategy,
}

/// Summary outcome for one section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionSummary {
    /// The model produced a summary.
    Ok {
        /// Summary text, capped at the configured word budget.
        summary: String,
    },
    /// The model failed for this section only.
    Unavailable {
        /// Failure description.
        error: String,
        /// Whether retrying later may succeed.
        transient: bool,
    },
}

impl SectionSummary {
    /// Whether a summary was produced.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Per-section entry of a processing response.
#[derive(Clone, Debug, Serialize)]
pub struct SectionReport {
    /// Section ordinal.
    pub ordinal: usize,
    /// Canonical section title.
    pub title: String,
    /// Heading line as written in the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Character count of the section body.
    pub characters: usize,
    /// Number of chunks cut from the section.
    pub chunk_count: usize,
    /// Summary outcome.
    pub summary: SectionSummary,
}

/// Size statistics for a processed document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    /// Pages (or text files) read.
    pub page_count: usize,
    /// Pages without text.
    pub skipped_pages: usize,
    /// Number of sections.
    pub section_count: usize,
    /// Number of chunks.
    pub chunk_count: usize,
    /// Characters of extracted text.
    pub total_characters: usize,
    /// Words of extracted text.
    pub total_words: usize,
}

/// Description of a document's similarity index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    /// Embedding model that produced the vectors.
    pub embedding_model: String,
    /// Vector dimension.
    pub dimension: usize,
    /// Number of indexed chunks.
    pub entries: usize,
}

/// Result of processing an upload.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessOutcome {
    /// Identifier for follow-up requests.
    pub document_id: DocumentId,
    /// Uploaded filename.
    pub filename: String,
    /// SHA-256 of the uploaded bytes.
    pub content_hash: String,
    /// RFC 3339 processing timestamp.
    pub processed_at: String,
    /// Sections with their summary outcome.
    pub sections: Vec<SectionReport>,
    /// Document overview.
    pub document_summary: DocumentSummary,
    /// Every chunk in id order.
    pub chunks: Vec<Chunk>,
    /// Size statistics.
    pub stats: DocumentStats,
    /// Index description.
    pub index: IndexInfo,
}

/// Section text re-sent by a client for quiz generation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkInput {
    /// Section title, if known.
    #[serde(default)]
    pub section: Option<String>,
    /// Chunk text.
    #[serde(default)]
    pub text: String,
}

/// Quiz generation request.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChallengeRequest {
    /// Document to quiz on; defaults to the active document.
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    /// Explicit chunks to quiz on instead of a stored document.
    #[serde(default)]
    pub chunks: Option<Vec<ChunkInput>>,
    /// Questions per section.
    #[serde(default)]
    pub count: Option<usize>,
}

/// Generated comprehension question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuizItem {
    /// One-based sequence number within the response.
    pub id: usize,
    /// Ordinal of the source section, when it came from a stored document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_ordinal: Option<usize>,
    /// Title of the source section.
    pub section: String,
    /// Question text, ending in `?`.
    pub question: String,
    /// Answer proposed by the model, if it gave one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
}

/// Quiz unit that produced no question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    /// Section title of the unit.
    pub section: String,
    /// Failure description.
    pub error: String,
    /// Whether retrying later may succeed.
    pub transient: bool,
}

/// Result of a quiz request.
#[derive(Clone, Debug, Serialize)]
pub struct ChallengeOutcome {
    /// Document the quiz was drawn from; absent for re-sent chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    /// Generated questions.
    pub questions: Vec<QuizItem>,
    /// Units that failed.
    pub failures: Vec<UnitFailure>,
    /// `questions.len()`.
    pub total_questions: usize,
}

/// Free-form question about a document.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AskRequest {
    /// Question text (`query` is accepted as an alias).
    #[serde(default, alias = "query")]
    pub question: Option<String>,
    /// Document to ask about; defaults to the active document.
    #[serde(default)]
    pub document_id: Option<DocumentId>,
    /// Number of chunks to retrieve, within 1..=20.
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Chunk cited in an answer or evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceRef {
    /// Chunk id.
    pub chunk_id: usize,
    /// Section title.
    pub section: String,
    /// Paragraph number within the section.
    pub paragraph: usize,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Chunk text.
    pub text: String,
}

/// How well an answer is supported by the retrieved context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Answer cites or overlaps the context.
    High,
    /// Answer shows little connection to the context.
    Medium,
}

/// Answer produced by the retrieval pipeline.
#[derive(Clone, Debug, Serialize)]
pub struct AnswerRecord {
    /// Document the answer was drawn from.
    pub document_id: DocumentId,
    /// Question as asked.
    pub question: String,
    /// Generated answer.
    pub answer: String,
    /// Chunks placed in the prompt, best first.
    pub sources: Vec<SourceRef>,
    /// Grounding confidence.
    pub confidence: Confidence,
}

/// Reader answer to be graded.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EvaluationRequest {
    /// Quiz question.
    #[serde(default)]
    pub question: Option<String>,
    /// Reader's answer.
    #[serde(default)]
    pub answer: Option<String>,
    /// Document to grade against; defaults to the active document.
    #[serde(default)]
    pub document_id: Option<DocumentId>,
}

/// Feedback on a reader's answer.
#[derive(Clone, Debug, Serialize)]
pub struct EvaluationOutcome {
    /// Document the evaluation was grounded in.
    pub document_id: DocumentId,
    /// Question as asked.
    pub question: String,
    /// Answer as given.
    pub user_answer: String,
    /// Generated feedback.
    pub feedback: String,
    /// Whether the feedback is tied to the retrieved context.
    pub grounded: bool,
    /// Chunks placed in the prompt.
    pub sources: Vec<SourceRef>,
}

/// Statistics for a retained document.
#[derive(Clone, Debug, Serialize)]
pub struct DocumentInfo {
    /// Document id.
    pub document_id: DocumentId,
    /// Uploaded filename.
    pub filename: String,
    /// SHA-256 of the uploaded bytes.
    pub content_hash: String,
    /// RFC 3339 processing timestamp.
    pub processed_at: String,
    /// Whether this is the active document.
    pub active: bool,
    /// Section titles in order.
    pub sections: Vec<String>,
    /// Size statistics.
    pub stats: DocumentStats,
    /// Index description.
    pub index: IndexInfo,
    /// Document overview.
    pub document_summary: DocumentSummary,
}

/// Liveness report.
#[derive(Clone, Debug, Serialize)]
pub struct HealthSnapshot {
    /// Always `healthy` while the server answers.
    pub status: &'static str,
    /// Active document, if any.
    pub active_document: Option<DocumentId>,
    /// Number of retained documents.
    pub retained_documents: usize,
    /// Embedding model in use.
    pub embedding_model: String,
    /// Generative model in use.
    pub generation_model: String,
}
