//! Section summaries and the document overview.
//!
//! Each section is summarized independently; a failed call marks that section unavailable and
//! leaves the others untouched. The overview falls back to a deterministic extractive summary
//! when the model cannot produce one.

use futures_util::{StreamExt, stream};

use crate::extract::Section;
use crate::generation::GenerationClient;
use crate::processing::settings::PipelineSettings;
use crate::processing::text::{cap_words, count_words, truncate_chars};
use crate::processing::types::{DocumentSummary, SectionSummary, SummaryStrategy};
use crate::prompts::{PromptTemplates, TemplateName};

const OVERVIEW_SECTIONS: usize = 4;
const OVERVIEW_SECTION_CHARS: usize = 400;
const OVERVIEW_TOTAL_CHARS: usize = 1800;
const EXTRACTIVE_SENTENCE_CHARS: usize = 240;

/// Summarize every section, preserving section order.
pub async fn summarize_sections(
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    sections: &[Section],
) -> Vec<SectionSummary> {
    let pending: Vec<_> = sections
        .iter()
        .map(|section| summarize_section(generator, templates, settings, section))
        .collect();
    stream::iter(pending)
        .buffered(settings.generation_concurrency.max(1))
        .collect()
        .await
}

async fn summarize_section(
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    section: &Section,
) -> SectionSummary {
    let max_words = settings.summary_max_words.to_string();
    let prompt = match templates.render(
        TemplateName::Summarize,
        &[
            ("title", section.title.as_str()),
            ("text", truncate_chars(&section.text, settings.summary_input_chars)),
            ("max_words", max_words.as_str()),
        ],
    ) {
        Ok(prompt) => prompt,
        Err(error) => {
            return SectionSummary::Unavailable {
                error: error.to_string(),
                transient: false,
            };
        }
    };

    match generator.generate(settings.generation_request(prompt)).await {
        Ok(reply) => SectionSummary::Ok {
            summary: cap_words(&reply, settings.summary_max_words),
        },
        Err(error) => {
            tracing::warn!(
                section = %section.title,
                ordinal = section.ordinal,
                error = %error,
                transient = error.is_transient(),
                "Section summary unavailable"
            );
            SectionSummary::Unavailable {
                error: error.to_string(),
                transient: error.is_transient(),
            }
        }
    }
}

/// Summarize the document as a whole from its leading sections.
pub async fn summarize_document(
    generator: &dyn GenerationClient,
    templates: &PromptTemplates,
    settings: &PipelineSettings,
    sections: &[Section],
) -> DocumentSummary {
    let excerpt = overview_excerpt(sections);
    let max_words = settings.summary_max_words.to_string();
    let prompt = templates.render(
        TemplateName::DocumentSummary,
        &[("sections", excerpt.as_str()), ("max_words", max_words.as_str())],
    );

    let reply = match prompt {
        Ok(prompt) => generator
            .generate(settings.generation_request(prompt))
            .await
            .map_err(|error| error.to_string()),
        Err(error) => Err(error.to_string()),
    };

    match reply {
        Ok(text) => DocumentSummary {
            text: cap_words(&text, settings.summary_max_words),
            strategy: SummaryStrategy::Abstractive,
        },
        Err(error) => {
            tracing::warn!(error = %error, "Falling back to extractive document summary");
            DocumentSummary {
                text: build_extractive_summary(sections, settings.summary_max_words),
                strategy: SummaryStrategy::Extractive,
            }
        }
    }
}

fn overview_excerpt(sections: &[Section]) -> String {
    let mut excerpt = String::new();
    for section in sections.iter().take(OVERVIEW_SECTIONS) {
        let block = format!(
            "{}:\n{}\n\n",
            section.title,
            truncate_chars(section.text.trim(), OVERVIEW_SECTION_CHARS)
        );
        let remaining = OVERVIEW_TOTAL_CHARS.saturating_sub(excerpt.chars().count());
        if remaining == 0 {
            break;
        }
        excerpt.push_str(truncate_chars(&block, remaining));
    }
    excerpt.trim_end().to_string()
}

/// Leading sentence of each section, within `max_words` words.
pub(crate) fn build_extractive_summary(sections: &[Section], max_words: usize) -> String {
    let mut sentences = Vec::new();
    let mut used_words = 0usize;

    for section in sections {
        let sentence = first_sentence(section.text.trim());
        if sentence.is_empty() {
            continue;
        }
        let sentence = truncate_chars(sentence, EXTRACTIVE_SENTENCE_CHARS);
        let words = count_words(sentence);
        if !sentences.is_empty() && used_words + words > max_words {
            break;
        }
        used_words += words;
        sentences.push(sentence);
        if used_words >= max_words {
            break;
        }
    }

    cap_words(&sentences.join(" "), max_words)
}

fn first_sentence(text: &str) -> &str {
    let end = text
        .char_indices()
        .find(|(offset, c)| {
            matches!(c, '.' | '!' | '?')
                && text[offset + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_none_or(char::is_whitespace)
        })
        .map(|(offset, c)| offset + c.len_utf8());
    match end {
        Some(end) => text[..end].trim(),
        None => text.lines().next().unwrap_or(text).trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationClientError, GenerationRequest};
    use async_trait::async_trait;

    struct ScriptedGenerator;

    #[async_trait]
    impl GenerationClient for ScriptedGenerator {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<String, GenerationClientError> {
            if request.prompt.contains("\"Results\"") {
                Err(GenerationClientError::Timeout)
            } else if request.prompt.contains("sections of a document") {
                Err(GenerationClientError::EmptyResponse)
            } else {
                Ok("one two three four five six seven".into())
            }
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn section(ordinal: usize, title: &str, text: &str) -> Section {
        Section {
            ordinal,
            title: title.to_string(),
            heading: Some(title.to_string()),
            text: text.to_string(),
        }
    }

    fn settings(max_words: usize) -> PipelineSettings {
        PipelineSettings {
            summary_max_words: max_words,
            ..PipelineSettings::default()
        }
    }

    #[tokio::test]
    async fn failing_section_is_isolated() {
        let sections = vec![
            section(0, "Introduction", "Intro text."),
            section(1, "Results", "Result text."),
            section(2, "Conclusion", "Closing text."),
        ];
        let summaries = summarize_sections(
            &ScriptedGenerator,
            &PromptTemplates::default(),
            &settings(5),
            &sections,
        )
        .await;

        assert_eq!(summaries.len(), 3);
        assert_eq!(
            summaries[0],
            SectionSummary::Ok {
                summary: "one two three four five...".into()
            }
        );
        assert!(matches!(
            &summaries[1],
            SectionSummary::Unavailable { transient: true, .. }
        ));
        assert!(summaries[2].is_ok());
    }

    #[tokio::test]
    async fn overview_falls_back_to_extractive() {
        let sections = vec![
            section(0, "Introduction", "Documents are split into sections. More detail follows."),
            section(1, "Methods", "Chunks are embedded! Then indexed."),
        ];
        let summary = summarize_document(
            &ScriptedGenerator,
            &PromptTemplates::default(),
            &settings(50),
            &sections,
        )
        .await;

        assert_eq!(summary.strategy, SummaryStrategy::Extractive);
        assert_eq!(
            summary.text,
            "Documents are split into sections. Chunks are embedded!"
        );
    }

    #[test]
    fn extractive_summary_respects_word_budget() {
        let sections = vec![
            section(0, "A", "alpha beta gamma delta. Second sentence."),
            section(1, "B", "epsilon zeta eta theta. Another."),
        ];
        assert_eq!(build_extractive_summary(&sections, 4), "alpha beta gamma delta.");
        assert_eq!(build_extractive_summary(&sections, 2), "alpha beta...");
    }

    #[test]
    fn first_sentence_ignores_decimal_points() {
        assert_eq!(first_sentence("Version 2.5 shipped. Then more."), "Version 2.5 shipped.");
        assert_eq!(first_sentence("no terminator\nsecond line"), "no terminator");
    }

    #[test]
    fn overview_excerpt_is_bounded() {
        let long = "word ".repeat(200);
        let sections: Vec<_> = (0..6)
            .map(|idx| section(idx, &format!("S{idx}"), &long))
            .collect();
        let excerpt = overview_excerpt(&sections);
        assert!(excerpt.chars().count() <= OVERVIEW_TOTAL_CHARS);
        assert!(excerpt.starts_with("S0:"));
        assert!(!excerpt.contains("S4:"));
    }
}
