//! Retrieval-augmented question answering.
//!
//! A question moves through EMBED_QUERY, RETRIEVE, COMPOSE_PROMPT, and GENERATE. Any failure
//! is reported as a [`QaError`] tagged with the stage it happened in; nothing is retried.

use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::generation::GenerationClient;
use crate::processing::settings::PipelineSettings;
use crate::processing::text::{shared_words, truncate_chars};
use crate::processing::types::{
    AnswerRecord, Confidence, QaError, QaFailure, QaStage, SourceRef,
};
use crate::prompts::{PromptTemplates, TemplateName};
use crate::store::ProcessedDocument;

const ANSWER_GROUNDING_WORDS: usize = 3;

/// Context block assembled from retrieved chunks.
#[derive(Debug)]
pub(crate) struct Retrieval {
    /// Chunks that made it into `context`, best first.
    pub(crate) sources: Vec<SourceRef>,
    /// Numbered source blocks.
    pub(crate) context: String,
}

/// Embed `text` and check it against the document's index dimension.
pub(crate) async fn embed_query(
    embedder: &dyn EmbeddingClient,
    document: &ProcessedDocument,
    text: &str,
) -> Result<Vec<f32>, QaError> {
    let vectors = embedder
        .generate_embeddings(vec![text.to_string()])
        .await
        .map_err(|error| QaError::new(QaStage::EmbedQuery, error))?;
    let [vector]: [Vec<f32>; 1] = vectors.try_into().map_err(|vectors: Vec<Vec<f32>>| {
        QaError::new(
            QaStage::EmbedQuery,
            EmbeddingClientError::InvalidResponse(format!(
                "expected one query vector, got {}",
                vectors.len()
            )),
        )
    })?;

    let expected = document.index.dimension();
    if vector.len() != expected {
        return Err(QaError::new(
            QaStage::EmbedQuery,
            EmbeddingClientError::DimensionMismatch {
                expected,
                actual: vector.len(),
            },
        ));
    }
    Ok(vector)
}

/// Top-`k` chunks for `query`, best first.
pub(crate) fn retrieve(
    document: &ProcessedDocument,
    query: &[f32],
    k: usize,
) -> Result<Vec<SourceRef>, QaError> {
    let hits = document
        .index
        .search(query, k)
        .map_err(|error| QaError::new(QaStage::Retrieve, error))?;
    let sources: Vec<SourceRef> = hits
        .into_iter()
        .filter_map(|hit| {
            document.chunk(hit.chunk_id).map(|chunk| SourceRef {
                chunk_id: chunk.id,
                section: chunk.section.clone(),
                paragraph: chunk.paragraph,
                score: hit.score,
                text: chunk.text.clone(),
            })
        })
        .collect();
    if sources.is_empty() {
        return Err(QaError::new(QaStage::Retrieve, QaFailure::NoRelevantChunks));
    }
    Ok(sources)
}

/// Number the sources and keep whole blocks until `budget` characters are used.
///
/// The first source is always kept, truncated if it alone exceeds the budget.
pub(crate) fn compose_context(sources: Vec<SourceRef>, budget: usize) -> Retrieval {
    let mut context = String::new();
    let mut used = Vec::new();

    for source in sources {
        let block = format!(
            "[SOURCE {} - Section: {}, Paragraph: {}]\n{}\n\n",
            used.len() + 1,
            source.section,
            source.paragraph,
            source.text.trim()
        );
        if used.is_empty() {
            context.push_str(truncate_chars(&block, budget));
        } else if context.chars().count() + block.chars().count() > budget {
            break;
        } else {
            context.push_str(&block);
        }
        used.push(source);
    }

    Retrieval {
        sources: used,
        context: context.trim_end().to_string(),
    }
}

/// Whether the text cites the numbered sources.
pub(crate) fn cites_sources(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("source") || lower.contains("section")
}

fn is_answer_grounded(answer: &str, context: &str) -> bool {
    cites_sources(answer) || shared_words(answer, context) > ANSWER_GROUNDING_WORDS
}

/// Answer `question` from `document`, retrieving `top_k` chunks.
pub async fn answer_question(
    embedder: &dyn EmbeddingClient,
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    document: &ProcessedDocument,
    question: &str,
    top_k: usize,
) -> Result<AnswerRecord, QaError> {
    tracing::debug!(document_id = %document.id, stage = %QaStage::EmbedQuery, "Answering question");
    let vector = embed_query(embedder, document, question).await?;

    tracing::debug!(stage = %QaStage::Retrieve, top_k, "Retrieving chunks");
    let sources = retrieve(document, &vector, top_k)?;

    tracing::debug!(stage = %QaStage::ComposePrompt, candidates = sources.len(), "Composing prompt");
    let retrieval = compose_context(sources, settings.answer_context_chars);
    let prompt = templates
        .render(
            TemplateName::Answer,
            &[
                ("context", retrieval.context.as_str()),
                ("question", question),
            ],
        )
        .map_err(|error| QaError::new(QaStage::ComposePrompt, error))?;

    tracing::debug!(stage = %QaStage::Generate, sources = retrieval.sources.len(), "Generating answer");
    let answer = generator
        .generate(settings.generation_request(prompt))
        .await
        .map_err(|error| QaError::new(QaStage::Generate, error))?;

    let confidence = if is_answer_grounded(&answer, &retrieval.context) {
        Confidence::High
    } else {
        Confidence::Medium
    };

    Ok(AnswerRecord {
        document_id: document.id,
        question: question.to_string(),
        answer,
        sources: retrieval.sources,
        confidence,
    })
}
