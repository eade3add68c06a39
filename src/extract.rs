//! Text extraction and section splitting for uploaded documents.
//!
//! PDFs are read page by page through `pdf-extract`; plain-text uploads are decoded as UTF-8
//! with a Latin-1 fallback. Extraction is best-effort:
//!
//! - pages whose text is whitespace-only are omitted and counted as skipped,
//! - sections whose body is whitespace-only are omitted,
//! - section ordinals are assigned after omission, so they stay contiguous.
//!
//! A document left with no text at all is rejected with [`ExtractionError::NoExtractableText`].

use regex::Regex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;
use thiserror::Error;

/// Headings recognised as section boundaries.
const SECTION_HEADINGS: &[&str] = &[
    "Abstract",
    "Introduction",
    "Background",
    "Methodology",
    "Methods",
    "Results",
    "Discussion",
    "Conclusion",
    "References",
    "Literature Review",
    "Related Work",
    "Experiments",
    "Analysis",
    "Findings",
    "Summary",
    "Overview",
    "Executive Summary",
    "Objectives",
    "Scope",
    "Definitions",
];

/// Title given to text that precedes the first recognised heading.
pub const DEFAULT_SECTION_TITLE: &str = "Main Content";

static HEADING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = SECTION_HEADINGS
        .iter()
        .map(|heading| regex::escape(heading).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"(?i)^(?:\d+(?:\.\d+)*\.?\s*)?({alternatives})\s*:?$"
    ))
    .expect("section heading pattern is valid")
});

/// Reasons an upload could not be turned into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The filename does not carry a supported extension.
    #[error("unsupported document format '{0}'; only PDF and TXT files are accepted")]
    UnsupportedFormat(String),
    /// The upload contained no bytes.
    #[error("document is empty")]
    Empty,
    /// The PDF parser rejected the file.
    #[error("document could not be read: {0}")]
    Unreadable(String),
    /// Parsing succeeded but no page carried any text (e.g. scanned images).
    #[error("no extractable text found in document")]
    NoExtractableText,
}

/// Formats accepted by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Plain text.
    Text,
}

impl DocumentFormat {
    /// Detect the format from a filename extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self, ExtractionError> {
        let lower = filename.trim().to_lowercase();
        if lower.ends_with(".pdf") {
            Ok(Self::Pdf)
        } else if lower.ends_with(".txt") {
            Ok(Self::Text)
        } else {
            Err(ExtractionError::UnsupportedFormat(filename.to_string()))
        }
    }
}

/// Contiguous, heading-delimited region of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Zero-based position among the retained sections.
    pub ordinal: usize,
    /// Canonical heading name, or [`DEFAULT_SECTION_TITLE`].
    pub title: String,
    /// Heading line exactly as it appeared in the source, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// Body text of the section.
    pub text: String,
}

/// Output of [`extract_document`].
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    /// Number of pages reported by the parser (1 for plain text).
    pub page_count: usize,
    /// Pages dropped because they held no text.
    pub skipped_pages: usize,
    /// Text of the retained pages joined by blank lines.
    pub full_text: String,
    /// Ordered, non-empty sections.
    pub sections: Vec<Section>,
}

/// Extract text and split it into sections.
pub fn extract_document(
    bytes: &[u8],
    format: DocumentFormat,
) -> Result<ExtractedDocument, ExtractionError> {
    let pages = extract_pages(bytes, format)?;
    let page_count = pages.len();
    let retained: Vec<&str> = pages
        .iter()
        .map(|page| page.trim_end())
        .filter(|page| !page.trim().is_empty())
        .collect();
    let skipped_pages = page_count - retained.len();
    if retained.is_empty() {
        return Err(ExtractionError::NoExtractableText);
    }

    let full_text = retained.join("\n\n");
    let sections = split_into_sections(&full_text);
    if sections.is_empty() {
        return Err(ExtractionError::NoExtractableText);
    }

    tracing::info!(
        ?format,
        page_count,
        skipped_pages,
        characters = full_text.chars().count(),
        sections = sections.len(),
        "Extracted document text"
    );

    Ok(ExtractedDocument {
        page_count,
        skipped_pages,
        full_text,
        sections,
    })
}

/// Return the raw text of every page, in order.
pub fn extract_pages(bytes: &[u8], format: DocumentFormat) -> Result<Vec<String>, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }
    match format {
        DocumentFormat::Pdf => extract_pdf_pages(bytes),
        DocumentFormat::Text => Ok(vec![decode_text(bytes)]),
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));
    match outcome {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(error)) => {
            tracing::warn!(error = %error, "PDF parsing failed");
            Err(ExtractionError::Unreadable(error.to_string()))
        }
        Err(_) => {
            tracing::warn!("PDF parser panicked on malformed input");
            Err(ExtractionError::Unreadable(
                "PDF structure is malformed".to_string(),
            ))
        }
    }
}

fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            tracing::debug!("Upload is not valid UTF-8; decoding as Latin-1");
            bytes.iter().map(|&byte| char::from(byte)).collect()
        }
    }
}

/// Split text into sections at recognised heading lines.
pub fn split_into_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut title = DEFAULT_SECTION_TITLE.to_string();
    let mut heading: Option<String> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.lines() {
        if let Some(canonical) = canonical_heading(line) {
            push_section(&mut sections, title, heading, &buffer);
            title = canonical.to_string();
            heading = Some(line.trim().to_string());
            buffer.clear();
            continue;
        }
        buffer.push(line);
    }
    push_section(&mut sections, title, heading, &buffer);

    tracing::debug!(
        titles = ?sections.iter().map(|section| section.title.as_str()).collect::<Vec<_>>(),
        "Split document into sections"
    );
    sections
}

fn push_section(
    sections: &mut Vec<Section>,
    title: String,
    heading: Option<String>,
    lines: &[&str],
) {
    let body = lines.join("\n");
    let body = body.trim();
    if body.is_empty() {
        tracing::debug!(title, "Omitting empty section");
        return;
    }
    sections.push(Section {
        ordinal: sections.len(),
        title,
        heading,
        text: body.to_string(),
    });
}

fn canonical_heading(line: &str) -> Option<&'static str> {
    let captures = HEADING_PATTERN.captures(line.trim())?;
    let matched = captures.get(1)?.as_str();
    let normalized = matched.split_whitespace().collect::<Vec<_>>().join(" ");
    SECTION_HEADINGS
        .iter()
        .copied()
        .find(|heading| heading.eq_ignore_ascii_case(&normalized))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    /// Build a small but well-formed PDF with one Helvetica text line per page.
    fn minimal_pdf(pages: &[&str]) -> Vec<u8> {
        let mut objects: Vec<String> = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                (0..pages.len())
                    .map(|index| format!("{} 0 R", 4 + index * 2))
                    .collect::<Vec<_>>()
                    .join(" "),
                pages.len()
            ),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        for (index, text) in pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                5 + index * 2
            ));
            let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
            objects.push(format!(
                "<< /Length {} >>\nstream\n{stream}\nendstream",
                stream.len()
            ));
        }

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (index, object) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{object}\nendobj\n", index + 1).as_bytes());
        }
        let xref_offset = out.len();
        out.extend_from_slice(
            format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes(),
        );
        for offset in offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(DocumentFormat::from_filename("Paper.PDF").unwrap(), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_filename("notes.txt").unwrap(), DocumentFormat::Text);
        assert!(matches!(
            DocumentFormat::from_filename("slides.pptx"),
            Err(ExtractionError::UnsupportedFormat(name)) if name == "slides.pptx"
        ));
    }

    #[test]
    fn headings_split_sections_in_order() {
        let text = "Preamble line.\n\nIntroduction\nWe study chunking.\n2. Methods\nWe split text.\nRESULTS:\nIt works.";
        let sections = split_into_sections(text);
        let titles: Vec<_> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Main Content", "Introduction", "Methods", "Results"]);
        let ordinals: Vec<_> = sections.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
        assert_eq!(sections[2].heading.as_deref(), Some("2. Methods"));
        assert_eq!(sections[3].text, "It works.");
    }

    #[test]
    fn multi_word_and_numbered_headings_are_recognised() {
        assert_eq!(canonical_heading("  3.1 Related   Work "), Some("Related Work"));
        assert_eq!(canonical_heading("executive summary"), Some("Executive Summary"));
        assert_eq!(canonical_heading("Summary"), Some("Summary"));
        assert_eq!(canonical_heading("Introduction to the topic"), None);
        assert_eq!(canonical_heading("The results were good"), None);
    }

    #[test]
    fn empty_sections_are_omitted_and_ordinals_stay_contiguous() {
        let text = "Abstract\n\n   \nIntroduction\nBody one.\nConclusion\nBody two.";
        let sections = split_into_sections(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].title, "Introduction");
        assert_eq!(sections[0].ordinal, 0);
        assert_eq!(sections[1].title, "Conclusion");
        assert_eq!(sections[1].ordinal, 1);
    }

    #[test]
    fn repeated_headings_produce_distinct_sections() {
        let sections = split_into_sections("Results\nFirst batch.\nResults\nSecond batch.");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].text, "First batch.");
        assert_eq!(sections[1].text, "Second batch.");
    }

    #[test]
    fn sections_cover_source_words() {
        let text = "Intro words here.\nIntroduction\nAlpha beta gamma.\n\nDelta epsilon.\n1. Discussion\nZeta eta theta.";
        let extracted = extract_document(text.as_bytes(), DocumentFormat::Text).expect("extract");
        let mut covered = Vec::new();
        for section in &extracted.sections {
            if let Some(heading) = &section.heading {
                covered.extend(words(heading));
            }
            covered.extend(words(&section.text));
        }
        assert_eq!(covered, words(text));
    }

    #[test]
    fn text_decoding_falls_back_to_latin1() {
        let bytes = b"Caf\xe9 cr\xe8me";
        let pages = extract_pages(bytes, DocumentFormat::Text).expect("pages");
        assert_eq!(pages, vec!["Café crème".to_string()]);
    }

    #[test]
    fn empty_and_blank_uploads_are_rejected() {
        assert!(matches!(
            extract_document(b"", DocumentFormat::Text),
            Err(ExtractionError::Empty)
        ));
        assert!(matches!(
            extract_document(b"  \n\t ", DocumentFormat::Text),
            Err(ExtractionError::NoExtractableText)
        ));
    }

    #[test]
    fn malformed_pdf_is_unreadable_not_a_crash() {
        let result = extract_document(b"%PDF-1.4\nthis is not a pdf", DocumentFormat::Pdf);
        assert!(matches!(result, Err(ExtractionError::Unreadable(_))));
    }

    #[test]
    fn pdf_pages_are_extracted_in_order() {
        let pdf = minimal_pdf(&["Introduction", "Retrieval pipelines embed chunks"]);
        let pages = extract_pages(&pdf, DocumentFormat::Pdf).expect("pdf pages");
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Introduction"));
        assert!(pages[1].contains("Retrieval"));
    }
}
