//! Grading a reader's answer against retrieved document context.

use crate::embedding::EmbeddingClient;
use crate::generation::GenerationClient;
use crate::processing::qa::{cites_sources, compose_context, embed_query, retrieve};
use crate::processing::settings::PipelineSettings;
use crate::processing::text::shared_words;
use crate::processing::types::{EvaluationOutcome, QaError, QaStage};
use crate::prompts::{PromptTemplates, TemplateName};
use crate::store::ProcessedDocument;

const CONTEXT_GROUNDING_WORDS: usize = 5;
const ANSWER_GROUNDING_WORDS: usize = 3;

/// Evaluate `user_answer` to `question` using the chunks most similar to the question.
pub async fn evaluate_answer(
    embedder: &dyn EmbeddingClient,
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    document: &ProcessedDocument,
    question: &str,
    user_answer: &str,
) -> Result<EvaluationOutcome, QaError> {
    let vector = embed_query(embedder, document, question).await?;
    let sources = retrieve(document, &vector, settings.retrieval_top_k)?;
    let retrieval = compose_context(sources, settings.evaluation_context_chars);

    let prompt = templates
        .render(
            TemplateName::Evaluate,
            &[
                ("context", retrieval.context.as_str()),
                ("question", question),
                ("answer", user_answer),
            ],
        )
        .map_err(|error| QaError::new(QaStage::ComposePrompt, error))?;

    let feedback = generator
        .generate(settings.generation_request(prompt))
        .await
        .map_err(|error| QaError::new(QaStage::Generate, error))?;

    let grounded = is_evaluation_grounded(&feedback, &retrieval.context, user_answer);
    tracing::debug!(
        document_id = %document.id,
        sources = retrieval.sources.len(),
        grounded,
        "Evaluated answer"
    );

    Ok(EvaluationOutcome {
        document_id: document.id,
        question: question.to_string(),
        user_answer: user_answer.to_string(),
        feedback,
        grounded,
        sources: retrieval.sources,
    })
}

fn is_evaluation_grounded(feedback: &str, context: &str, user_answer: &str) -> bool {
    cites_sources(feedback)
        || (shared_words(feedback, context) > CONTEXT_GROUNDING_WORDS
            && shared_words(feedback, user_answer) > ANSWER_GROUNDING_WORDS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbeddingClient;
    use crate::generation::GenerationClientError;
    use crate::processing::qa::tests::{CannedGenerator, DIMENSION, indexed_document};

    const CHUNKS: [(&str, &str); 2] = [
        ("Methods", "Samples were dried for two days before weighing."),
        ("Results", "Dried samples lost forty percent of their mass."),
    ];

    #[tokio::test]
    async fn evaluation_uses_question_context() {
        let document = indexed_document(&CHUNKS).await;
        let generator = CannedGenerator::replying("Correct, as SOURCE 1 states.");
        let outcome = evaluate_answer(
            &HashedEmbeddingClient::new(DIMENSION),
            &generator,
            &PromptTemplates::default(),
            &PipelineSettings::default(),
            &document,
            "How much mass did dried samples lose?",
            "Forty percent",
        )
        .await
        .expect("evaluation");

        assert!(outcome.grounded);
        assert_eq!(outcome.user_answer, "Forty percent");
        assert_eq!(outcome.sources.len(), 2);
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Reader's answer: Forty percent"));
    }

    #[tokio::test]
    async fn generation_failure_is_stage_tagged() {
        let document = indexed_document(&CHUNKS).await;
        let generator = CannedGenerator::failing(|| GenerationClientError::Rejected {
            status: 401,
            body: "bad token".into(),
        });
        let error = evaluate_answer(
            &HashedEmbeddingClient::new(DIMENSION),
            &generator,
            &PromptTemplates::default(),
            &PipelineSettings::default(),
            &document,
            "How long were samples dried?",
            "Two days",
        )
        .await
        .unwrap_err();
        assert_eq!(error.stage, QaStage::Generate);
        assert!(!error.is_transient());
    }

    #[test]
    fn grounding_requires_citation_or_overlap() {
        let context = "samples were dried for two days before weighing and lost forty percent";
        assert!(is_evaluation_grounded("See the Results section.", context, "x"));
        assert!(is_evaluation_grounded(
            "Yes, samples were dried for two days before weighing",
            context,
            "samples were dried for two days"
        ));
        assert!(!is_evaluation_grounded("Good try.", context, "two days"));
    }
}
