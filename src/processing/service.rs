//! Processing service coordinating extraction, chunking, embedding, and generation.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    extract::{DocumentFormat, extract_document},
    generation::{GenerationClient, GenerationClientError, get_generation_client},
    index::VectorIndex,
    metrics::{MetricsSnapshot, ServiceMetrics},
    processing::{
        chunking::chunk_sections,
        evaluate::evaluate_answer,
        qa::answer_question,
        quiz::{generate_quiz, question_count, units_from_chunks, units_from_document},
        settings::{MAX_TOP_K, PipelineSettings},
        summarize::{summarize_document, summarize_sections},
        text::count_words,
        types::{
            AnswerRecord, AskRequest, ChallengeOutcome, ChallengeRequest, DocumentInfo,
            DocumentStats, DocumentUpload, EvaluationOutcome, EvaluationRequest, HealthSnapshot,
            IndexInfo, ProcessOutcome, ProcessingError, QueryError, SectionReport,
        },
    },
    prompts::{PromptTemplates, TemplateError},
    store::{DocumentId, DocumentStore, ProcessedDocument},
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Errors raised while assembling the service at startup.
#[derive(Debug, Error)]
pub enum ServiceInitError {
    /// Embedding client could not be built.
    #[error("Failed to initialize embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Generation client could not be built.
    #[error("Failed to initialize generation client: {0}")]
    Generation(#[from] GenerationClientError),
    /// Prompt templates failed to load or validate.
    #[error("Failed to load prompt templates: {0}")]
    Templates(#[from] TemplateError),
}

/// Coordinates the document pipeline and the query pipelines built on top of it.
///
/// The service owns the model clients, prompt templates, document store, and metrics registry.
/// Construct it once near process start and share it through an `Arc`.
pub struct DocQuestService {
    embedding_client: Arc<dyn EmbeddingClient>,
    generation_client: Arc<dyn GenerationClient>,
    templates: PromptTemplates,
    settings: PipelineSettings,
    store: DocumentStore,
    metrics: Arc<ServiceMetrics>,
}

/// Abstraction over the pipeline used by the HTTP surface.
#[async_trait]
pub trait DocQuestApi: Send + Sync {
    /// Extract, chunk, embed, and summarize an upload, then make it the active document.
    async fn process_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<ProcessOutcome, ProcessingError>;

    /// Generate comprehension questions.
    async fn generate_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeOutcome, QueryError>;

    /// Grade a reader's answer to a quiz question.
    async fn evaluate_answer(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationOutcome, QueryError>;

    /// Answer a free-form question.
    async fn ask(&self, request: AskRequest) -> Result<AnswerRecord, QueryError>;

    /// Describe a retained document.
    async fn document_info(&self, id: Option<DocumentId>) -> Result<DocumentInfo, QueryError>;

    /// Liveness and store status.
    async fn health(&self) -> HealthSnapshot;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl DocQuestService {
    /// Build the service from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServiceInitError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedding_client = get_embedding_client(config)?;
        tracing::info!(provider = ?config.generation_provider, "Initializing generation client");
        let generation_client = get_generation_client(config)?;
        let templates = PromptTemplates::load(config.prompt_templates_path.as_deref())?;

        Ok(Self::new(
            embedding_client,
            generation_client,
            templates,
            PipelineSettings::from_config(config),
            config.document_retention,
        ))
    }

    /// Assemble a service from explicit parts.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        generation_client: Arc<dyn GenerationClient>,
        templates: PromptTemplates,
        settings: PipelineSettings,
        retention: usize,
    ) -> Self {
        Self {
            embedding_client,
            generation_client,
            templates,
            settings,
            store: DocumentStore::new(retention),
            metrics: Arc::new(ServiceMetrics::new()),
        }
    }

    /// Process an upload and publish it as the active document.
    pub async fn process_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<ProcessOutcome, ProcessingError> {
        let DocumentUpload { filename, bytes } = upload;
        tracing::info!(filename = %filename, bytes = bytes.len(), "Processing document");
        let format = DocumentFormat::from_filename(&filename)?;
        let content_hash = hex::encode(Sha256::digest(&bytes));

        let chunking = self.settings.chunking.clone();
        let (extracted, chunks) = tokio::task::spawn_blocking(move || {
            let extracted = extract_document(&bytes, format)?;
            let chunks = chunk_sections(&extracted.sections, &chunking)?;
            Ok::<_, ProcessingError>((extracted, chunks))
        })
        .await
        .map_err(|error| ProcessingError::Internal(error.to_string()))??;
        tracing::debug!(
            sections = extracted.sections.len(),
            chunks = chunks.len(),
            chunk_size = self.settings.chunking.chunk_size,
            unit = ?self.settings.chunking.unit,
            "Chunked document"
        );

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let generator = self.generation_client.as_ref();
        let (index, section_summaries, document_summary) = tokio::join!(
            self.build_index(texts),
            summarize_sections(generator, &self.templates, &self.settings, &extracted.sections),
            summarize_document(generator, &self.templates, &self.settings, &extracted.sections),
        );
        let index = index?;

        let document = ProcessedDocument {
            id: DocumentId::new(),
            filename,
            content_hash,
            processed_at: current_timestamp_rfc3339(),
            page_count: extracted.page_count,
            skipped_pages: extracted.skipped_pages,
            total_characters: extracted.full_text.chars().count(),
            total_words: count_words(&extracted.full_text),
            sections: extracted.sections,
            chunks,
            index,
            section_summaries,
            document_summary,
        };
        let outcome = self.build_outcome(&document);
        let summary_failures = document
            .section_summaries
            .iter()
            .filter(|summary| !summary.is_ok())
            .count();

        let document = self.store.publish(document).await;
        self.metrics
            .record_document(document.chunks.len() as u64, summary_failures as u64);
        tracing::info!(
            document_id = %document.id,
            filename = %document.filename,
            sections = document.sections.len(),
            chunks = document.chunks.len(),
            summary_failures,
            "Document processed"
        );
        Ok(outcome)
    }

    async fn build_index(&self, texts: Vec<String>) -> Result<VectorIndex, ProcessingError> {
        let expected = texts.len();
        let vectors = self.embedding_client.generate_embeddings(texts).await?;
        if vectors.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                vectors.len()
            ))
            .into());
        }
        Ok(VectorIndex::build(
            self.embedding_client.dimension(),
            vectors.into_iter().enumerate(),
        )?)
    }

    fn build_outcome(&self, document: &ProcessedDocument) -> ProcessOutcome {
        let sections = document
            .sections
            .iter()
            .zip(&document.section_summaries)
            .map(|(section, summary)| SectionReport {
                ordinal: section.ordinal,
                title: section.title.clone(),
                heading: section.heading.clone(),
                characters: section.text.chars().count(),
                chunk_count: document
                    .chunks
                    .iter()
                    .filter(|chunk| chunk.section_ordinal == section.ordinal)
                    .count(),
                summary: summary.clone(),
            })
            .collect();

        ProcessOutcome {
            document_id: document.id,
            filename: document.filename.clone(),
            content_hash: document.content_hash.clone(),
            processed_at: document.processed_at.clone(),
            sections,
            document_summary: document.document_summary.clone(),
            chunks: document.chunks.clone(),
            stats: self.stats(document),
            index: self.index_info(document),
        }
    }

    fn stats(&self, document: &ProcessedDocument) -> DocumentStats {
        DocumentStats {
            page_count: document.page_count,
            skipped_pages: document.skipped_pages,
            section_count: document.sections.len(),
            chunk_count: document.chunks.len(),
            total_characters: document.total_characters,
            total_words: document.total_words,
        }
    }

    fn index_info(&self, document: &ProcessedDocument) -> IndexInfo {
        IndexInfo {
            embedding_model: self.embedding_client.model().to_string(),
            dimension: document.index.dimension(),
            entries: document.index.len(),
        }
    }

    /// Generate a quiz from a stored document or from re-sent chunks.
    ///
    /// An explicit `document_id` wins over `chunks`; with neither, the active document is used.
    pub async fn generate_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeOutcome, QueryError> {
        let ChallengeRequest {
            document_id,
            chunks,
            count,
        } = request;
        let count = question_count(count, &self.settings);

        let (document_id, units) = match (document_id, chunks) {
            (None, Some(chunks)) if !chunks.is_empty() => {
                (None, units_from_chunks(&chunks, &self.settings))
            }
            (document_id, _) => {
                let document = self.store.resolve(document_id).await?;
                (
                    Some(document.id),
                    units_from_document(&document, &self.settings),
                )
            }
        };
        if units.is_empty() {
            return Err(QueryError::InvalidRequest(
                "no section text available for quiz generation".into(),
            ));
        }

        let batch = generate_quiz(
            self.generation_client.as_ref(),
            &self.templates,
            &self.settings,
            &units,
            count,
        )
        .await;

        if batch.questions.is_empty() {
            let transient = batch.failures.iter().all(|failure| failure.transient);
            let message = batch
                .failures
                .last()
                .map(|failure| failure.error.clone())
                .unwrap_or_else(|| "no questions generated".into());
            tracing::warn!(units = units.len(), error = %message, "Quiz generation failed");
            return Err(QueryError::QuizUnavailable { message, transient });
        }

        self.metrics.record_quiz(batch.questions.len() as u64);
        tracing::info!(
            document_id = ?document_id,
            units = units.len(),
            questions = batch.questions.len(),
            failures = batch.failures.len(),
            "Quiz generated"
        );
        Ok(ChallengeOutcome {
            document_id,
            total_questions: batch.questions.len(),
            questions: batch.questions,
            failures: batch.failures,
        })
    }

    /// Answer a question against a stored document.
    pub async fn ask(&self, request: AskRequest) -> Result<AnswerRecord, QueryError> {
        let question = required_text(request.question.as_deref(), "question")?;
        let top_k = request.top_k.unwrap_or(self.settings.retrieval_top_k);
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(QueryError::InvalidRequest(format!(
                "top_k must be between 1 and {MAX_TOP_K}"
            )));
        }
        let document = self.store.resolve(request.document_id).await?;

        let result = answer_question(
            self.embedding_client.as_ref(),
            self.generation_client.as_ref(),
            &self.templates,
            &self.settings,
            &document,
            question,
            top_k,
        )
        .await;
        self.metrics.record_answer(result.is_ok());

        match result {
            Ok(record) => {
                tracing::info!(
                    document_id = %document.id,
                    sources = record.sources.len(),
                    confidence = ?record.confidence,
                    "Question answered"
                );
                Ok(record)
            }
            Err(error) => {
                tracing::warn!(
                    document_id = %document.id,
                    stage = %error.stage,
                    error = %error.source,
                    "Question failed"
                );
                Err(error.into())
            }
        }
    }

    /// Grade a reader's answer against a stored document.
    pub async fn evaluate_answer(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationOutcome, QueryError> {
        let question = required_text(request.question.as_deref(), "question")?;
        let answer = required_text(request.answer.as_deref(), "answer")?;
        let document = self.store.resolve(request.document_id).await?;

        let outcome = evaluate_answer(
            self.embedding_client.as_ref(),
            self.generation_client.as_ref(),
            &self.templates,
            &self.settings,
            &document,
            question,
            answer,
        )
        .await
        .map_err(|error| {
            tracing::warn!(stage = %error.stage, error = %error.source, "Evaluation failed");
            QueryError::from(error)
        })?;
        self.metrics.record_evaluation();
        Ok(outcome)
    }

    /// Describe a retained document; `None` selects the active one.
    pub async fn document_info(&self, id: Option<DocumentId>) -> Result<DocumentInfo, QueryError> {
        let document = self.store.resolve(id).await?;
        let active = self.store.active_id().await == Some(document.id);
        Ok(DocumentInfo {
            document_id: document.id,
            filename: document.filename.clone(),
            content_hash: document.content_hash.clone(),
            processed_at: document.processed_at.clone(),
            active,
            sections: document
                .sections
                .iter()
                .map(|section| section.title.clone())
                .collect(),
            stats: self.stats(&document),
            index: self.index_info(&document),
            document_summary: document.document_summary.clone(),
        })
    }

    /// Report liveness and store status.
    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "healthy",
            active_document: self.store.active_id().await,
            retained_documents: self.store.len().await,
            embedding_model: self.embedding_client.model().to_string(),
            generation_model: self.generation_client.model().to_string(),
        }
    }

    /// Retrieve the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl DocQuestApi for DocQuestService {
    async fn process_document(
        &self,
        upload: DocumentUpload,
    ) -> Result<ProcessOutcome, ProcessingError> {
        DocQuestService::process_document(self, upload).await
    }

    async fn generate_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<ChallengeOutcome, QueryError> {
        DocQuestService::generate_challenge(self, request).await
    }

    async fn evaluate_answer(
        &self,
        request: EvaluationRequest,
    ) -> Result<EvaluationOutcome, QueryError> {
        DocQuestService::evaluate_answer(self, request).await
    }

    async fn ask(&self, request: AskRequest) -> Result<AnswerRecord, QueryError> {
        DocQuestService::ask(self, request).await
    }

    async fn document_info(&self, id: Option<DocumentId>) -> Result<DocumentInfo, QueryError> {
        DocQuestService::document_info(self, id).await
    }

    async fn health(&self) -> HealthSnapshot {
        DocQuestService::health(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocQuestService::metrics_snapshot(self)
    }
}

fn required_text<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, QueryError> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| QueryError::InvalidRequest(format!("{field} is required and cannot be empty")))
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
