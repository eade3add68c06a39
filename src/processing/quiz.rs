//! Comprehension question generation.
//!
//! A quiz is built from one unit per distinct section. Every unit is generated and validated
//! on its own, so a failing section only shows up in `failures`.

use futures_util::{StreamExt, stream};
use regex::Regex;
use std::sync::LazyLock;

use crate::extract::DEFAULT_SECTION_TITLE;
use crate::generation::GenerationClient;
use crate::processing::settings::{MAX_QUIZ_QUESTIONS, PipelineSettings};
use crate::processing::text::{shared_words, truncate_chars};
use crate::processing::types::{ChunkInput, QuizItem, UnitFailure};
use crate::prompts::{PromptTemplates, TemplateName};
use crate::store::ProcessedDocument;

const MIN_QUESTION_CHARS: usize = 10;
const MIN_SHARED_WORDS: usize = 3;

static QUESTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:Q(?:uestion)?\s*)?\d+\s*[.):]|[-•*])?\s*(.+\?)$")
        .expect("question pattern is valid")
});

static ANSWER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\**\s*(?:expected\s+)?(?:answer|a)\s*\**\s*[:.)-]\s*\**\s*(.+)$")
        .expect("answer pattern is valid")
});

static OFF_DOCUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)external\s+knowledge|outside\s+(?:of\s+)?the\s+(?:document|text)|research\s+further|google\s+search|additional\s+sources",
    )
    .expect("off-document pattern is valid")
});

/// Text a quiz unit is generated from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct QuizUnit {
    pub(crate) section_ordinal: Option<usize>,
    pub(crate) section: String,
    pub(crate) text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ParsedQuestion {
    pub(crate) question: String,
    pub(crate) answer: Option<String>,
}

/// Questions and failures for a whole quiz request.
#[derive(Debug, Default)]
pub(crate) struct QuizBatch {
    pub(crate) questions: Vec<QuizItem>,
    pub(crate) failures: Vec<UnitFailure>,
}

/// Clamp a requested per-unit question count into the supported range.
pub(crate) fn question_count(requested: Option<usize>, settings: &PipelineSettings) -> usize {
    requested
        .unwrap_or(settings.quiz_question_count)
        .clamp(1, MAX_QUIZ_QUESTIONS)
}

/// One unit per distinct section of a stored document, in section order.
pub(crate) fn units_from_document(
    document: &ProcessedDocument,
    settings: &PipelineSettings,
) -> Vec<QuizUnit> {
    let mut units: Vec<QuizUnit> = Vec::new();
    for chunk in &document.chunks {
        match units.last_mut() {
            Some(unit) if unit.section_ordinal == Some(chunk.section_ordinal) => {
                append_bounded(&mut unit.text, &chunk.text, settings.quiz_context_chars);
            }
            _ => {
                if units.len() == settings.quiz_max_sections {
                    break;
                }
                units.push(QuizUnit {
                    section_ordinal: Some(chunk.section_ordinal),
                    section: chunk.section.clone(),
                    text: truncate_chars(chunk.text.trim(), settings.quiz_context_chars)
                        .to_string(),
                });
            }
        }
    }
    units
}

/// One unit per distinct section title among re-sent chunks, in first-seen order.
pub(crate) fn units_from_chunks(chunks: &[ChunkInput], settings: &PipelineSettings) -> Vec<QuizUnit> {
    let mut units: Vec<QuizUnit> = Vec::new();
    for chunk in chunks {
        let text = chunk.text.trim();
        if text.is_empty() {
            continue;
        }
        let section = chunk
            .section
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_SECTION_TITLE);
        if let Some(unit) = units.iter_mut().find(|unit| unit.section == section) {
            append_bounded(&mut unit.text, text, settings.quiz_context_chars);
        } else if units.len() < settings.quiz_max_sections {
            units.push(QuizUnit {
                section_ordinal: None,
                section: section.to_string(),
                text: truncate_chars(text, settings.quiz_context_chars).to_string(),
            });
        }
    }
    units
}

fn append_bounded(target: &mut String, text: &str, limit: usize) {
    let used = target.chars().count();
    if used + 1 >= limit {
        return;
    }
    target.push(' ');
    target.push_str(truncate_chars(text.trim(), limit - used - 1));
}

/// Generate up to `count` questions per unit.
pub(crate) async fn generate_quiz(
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    units: &[QuizUnit],
    count: usize,
) -> QuizBatch {
    let pending: Vec<_> = units
        .iter()
        .map(|unit| generate_unit(generator, templates, settings, unit, count))
        .collect();
    let results: Vec<Result<Vec<ParsedQuestion>, UnitFailure>> = stream::iter(pending)
        .buffered(settings.generation_concurrency.max(1))
        .collect()
        .await;

    let mut batch = QuizBatch::default();
    for (unit, result) in units.iter().zip(results) {
        match result {
            Ok(parsed) => {
                for question in parsed {
                    batch.questions.push(QuizItem {
                        id: batch.questions.len() + 1,
                        section_ordinal: unit.section_ordinal,
                        section: unit.section.clone(),
                        question: question.question,
                        expected_answer: question.answer,
                    });
                }
            }
            Err(failure) => batch.failures.push(failure),
        }
    }
    batch
}

async fn generate_unit(
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    unit: &QuizUnit,
    count: usize,
) -> Result<Vec<ParsedQuestion>, UnitFailure> {
    let failure = |error: String, transient: bool| UnitFailure {
        section: unit.section.clone(),
        error,
        transient,
    };

    let count_text = count.to_string();
    let prompt = templates
        .render(
            TemplateName::Quiz,
            &[
                ("section", unit.section.as_str()),
                ("text", unit.text.as_str()),
                ("count", count_text.as_str()),
            ],
        )
        .map_err(|error| failure(error.to_string(), false))?;

    let reply = generator
        .generate(settings.generation_request(prompt))
        .await
        .map_err(|error| {
            tracing::warn!(section = %unit.section, error = %error, "Quiz generation failed");
            failure(error.to_string(), error.is_transient())
        })?;

    let questions: Vec<ParsedQuestion> = parse_questions(&reply)
        .into_iter()
        .filter(|parsed| is_valid_question(&parsed.question, &unit.text))
        .take(count)
        .collect();

    if questions.is_empty() {
        tracing::warn!(section = %unit.section, "Model reply held no valid questions");
        return Err(failure("no valid questions in model reply".into(), false));
    }
    tracing::debug!(section = %unit.section, questions = questions.len(), "Generated quiz unit");
    Ok(questions)
}

/// Extract question lines and any answer line that directly follows each one.
pub(crate) fn parse_questions(reply: &str) -> Vec<ParsedQuestion> {
    let mut parsed: Vec<ParsedQuestion> = Vec::new();
    let mut awaiting_answer = false;

    for raw in reply.lines() {
        let cleaned = strip_emphasis(raw);
        let line = cleaned.as_str();
        if line.is_empty() {
            continue;
        }
        if awaiting_answer {
            if let Some(caps) = ANSWER_LINE.captures(line) {
                if let Some(last) = parsed.last_mut() {
                    last.answer = Some(caps[1].trim().trim_matches('*').trim().to_string());
                }
                awaiting_answer = false;
                continue;
            }
        }
        if let Some(caps) = QUESTION_LINE.captures(line) {
            let question = caps[1].trim().trim_matches('*').trim().to_string();
            parsed.push(ParsedQuestion {
                question,
                answer: None,
            });
            awaiting_answer = true;
        } else {
            awaiting_answer = false;
        }
    }
    parsed
}

/// Drop markdown bold markers and surrounding asterisks from a reply line.
fn strip_emphasis(line: &str) -> String {
    line.replace("**", "").trim().trim_matches('*').trim().to_string()
}

/// Whether `question` is well formed and tied to `source`.
pub(crate) fn is_valid_question(question: &str, source: &str) -> bool {
    question.chars().count() >= MIN_QUESTION_CHARS
        && question.ends_with('?')
        && !OFF_DOCUMENT.is_match(question)
        && shared_words(question, source) >= MIN_SHARED_WORDS
}
