//! Named prompt templates for every generative call.
//!
//! Built-in defaults can be overridden per template from a JSON object file
//! (`PROMPT_TEMPLATES_PATH`), e.g. `{"answer": "Context:\n{context}\nQ: {question}"}`.
//! Placeholders use `{name}` syntax; unknown placeholders are left untouched.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// Prompt for a single section summary.
pub const SUMMARIZE_PROMPT: &str = r#"Summarize the following section of a document, titled "{title}", in at most {max_words} words.
Use only information stated in the text. Do not add outside knowledge.

Text:
{text}

Summary:"#;

/// Prompt for the document-level overview.
pub const DOCUMENT_SUMMARY_PROMPT: &str = r#"Based on the following sections of a document, write a concise summary of at most {max_words} words.
Cover the main purpose of the document and its key findings. Use only the information provided.

{sections}

Summary:"#;

/// Prompt for comprehension questions on one section.
pub const QUIZ_PROMPT: &str = r#"Read the following text from the "{section}" section of a document and write exactly {count} questions that test logical understanding of it.

Rules:
- Every question must be answerable from the text alone.
- Number each question (1., 2., ...) and end it with a question mark.
- On the line after each question, give the expected answer starting with "Answer:".

Text:
{text}

Questions:"#;

/// Prompt for grounded question answering.
pub const ANSWER_PROMPT: &str = r#"Answer the question using only the numbered sources below.
Cite the sources you rely on as [SOURCE n]. If the sources do not contain the answer, say that the document does not provide it.

Sources:
{context}

Question: {question}

Answer:"#;

/// Prompt for grading a reader's answer to a quiz question.
pub const EVALUATE_PROMPT: &str = r#"You are grading a reader's answer to a question about a document. Use only the numbered sources below.

Sources:
{context}

Question: {question}
Reader's answer: {answer}

Say whether the answer is correct, partially correct, or incorrect, explain why, and cite the supporting sources as [SOURCE n].

Evaluation:"#;

/// Errors raised while loading or rendering templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template override file could not be read.
    #[error("Failed to read prompt templates from {path}: {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// Template override file is not a JSON object of strings.
    #[error("Failed to parse prompt templates: {0}")]
    Parse(#[from] serde_json::Error),
    /// Override file named a template that does not exist.
    #[error("Unknown prompt template '{0}'")]
    UnknownTemplate(String),
    /// A template lacks a placeholder its caller depends on.
    #[error("Template '{template}' is missing placeholder {{{placeholder}}}")]
    MissingPlaceholder {
        /// Template name.
        template: &'static str,
        /// Placeholder name without braces.
        placeholder: &'static str,
    },
    /// A render call did not supply a required value.
    #[error("No value supplied for {{{placeholder}}} in template '{template}'")]
    MissingValue {
        /// Template name.
        template: &'static str,
        /// Placeholder name without braces.
        placeholder: &'static str,
    },
}

/// Identifier of a prompt template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TemplateName {
    /// Per-section summary.
    Summarize,
    /// Document-level overview.
    DocumentSummary,
    /// Quiz question generation.
    Quiz,
    /// Retrieval-augmented answer.
    Answer,
    /// Answer evaluation.
    Evaluate,
}

impl TemplateName {
    /// Every template name.
    pub const ALL: [Self; 5] = [
        Self::Summarize,
        Self::DocumentSummary,
        Self::Quiz,
        Self::Answer,
        Self::Evaluate,
    ];

    /// Key used in override files.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::DocumentSummary => "document_summary",
            Self::Quiz => "quiz",
            Self::Answer => "answer",
            Self::Evaluate => "evaluate",
        }
    }

    /// Placeholders the template must contain.
    pub const fn required_placeholders(self) -> &'static [&'static str] {
        match self {
            Self::Summarize => &["title", "text", "max_words"],
            Self::DocumentSummary => &["sections", "max_words"],
            Self::Quiz => &["section", "text", "count"],
            Self::Answer => &["context", "question"],
            Self::Evaluate => &["context", "question", "answer"],
        }
    }

    const fn default_template(self) -> &'static str {
        match self {
            Self::Summarize => SUMMARIZE_PROMPT,
            Self::DocumentSummary => DOCUMENT_SUMMARY_PROMPT,
            Self::Quiz => QUIZ_PROMPT,
            Self::Answer => ANSWER_PROMPT,
            Self::Evaluate => EVALUATE_PROMPT,
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.key() == key)
    }
}

/// Validated set of prompt templates.
#[derive(Clone, Debug)]
pub struct PromptTemplates {
    templates: HashMap<TemplateName, String>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            templates: TemplateName::ALL
                .into_iter()
                .map(|name| (name, name.default_template().to_string()))
                .collect(),
        }
    }
}

impl PromptTemplates {
    /// Load defaults, applying overrides from `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self, TemplateError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Read a JSON object of `{name: template}` overrides.
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let raw = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let overrides: HashMap<String, String> = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            overrides = overrides.len(),
            "Loaded prompt template overrides"
        );
        Self::with_overrides(overrides)
    }

    /// Apply overrides on top of the defaults and validate placeholders.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Result<Self, TemplateError> {
        let mut templates = Self::default();
        for (key, template) in overrides {
            let name =
                TemplateName::from_key(&key).ok_or(TemplateError::UnknownTemplate(key))?;
            templates.templates.insert(name, template);
        }
        templates.validate()?;
        Ok(templates)
    }

    fn validate(&self) -> Result<(), TemplateError> {
        for name in TemplateName::ALL {
            let template = self.template(name);
            for &placeholder in name.required_placeholders() {
                if !template.contains(&format!("{{{placeholder}}}")) {
                    return Err(TemplateError::MissingPlaceholder {
                        template: name.key(),
                        placeholder,
                    });
                }
            }
        }
        Ok(())
    }

    fn template(&self, name: TemplateName) -> &str {
        self.templates
            .get(&name)
            .map(String::as_str)
            .unwrap_or_else(|| name.default_template())
    }

    /// Substitute `values` into the named template in a single pass.
    ///
    /// Every required placeholder must have a value; substituted text is never re-expanded.
    pub fn render(
        &self,
        name: TemplateName,
        values: &[(&str, &str)],
    ) -> Result<String, TemplateError> {
        for &placeholder in name.required_placeholders() {
            if !values.iter().any(|(key, _)| *key == placeholder) {
                return Err(TemplateError::MissingValue {
                    template: name.key(),
                    placeholder,
                });
            }
        }

        let rendered = PLACEHOLDER.replace_all(self.template(name), |caps: &Captures<'_>| {
            let key = &caps[1];
            values
                .iter()
                .find(|(candidate, _)| *candidate == key)
                .map(|(_, value)| (*value).to_string())
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}
