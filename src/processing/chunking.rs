//! Section chunking: bounded-size spans ready for embedding.
//!
//! - Boundaries: `semchunk-rs` prefers paragraph, line, sentence, then word boundaries. Its
//!   output is re-split at the last whitespace that fits whenever it exceeds the bound. A span
//!   with no boundary at all is cut at the bound and continues in the next chunk; nothing is
//!   dropped.
//! - Length: measured in characters by default, or in tiktoken tokens when the unit is
//!   `tokens`. Unknown tokenizer models fall back to `cl100k_base`.
//! - Overlap: the tail of the previous chunk (at most `overlap` units, snapped to a word
//!   boundary) is prepended to the next one. The tail shrinks until the result fits the
//!   bound; the next chunk's own text is never cut.
//!
//! Output is deterministic for a given input and settings.

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use crate::extract::Section;
use crate::processing::types::ChunkingError;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Unit used to measure chunk length.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Characters,
    /// Tokens of the configured tiktoken encoding.
    Tokens,
}

impl std::str::FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Parameters controlling chunk boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkingSettings {
    /// Hard upper bound on chunk length.
    pub chunk_size: usize,
    /// Requested overlap between adjacent chunks; clamped to `chunk_size - 1`.
    pub overlap: usize,
    /// How length is measured.
    pub unit: ChunkUnit,
    /// Model whose tokenizer is used when `unit` is [`ChunkUnit::Tokens`].
    pub tokenizer_model: String,
}

/// Bounded text span derived from one section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Zero-based position across the whole document.
    pub id: usize,
    /// Ordinal of the section this chunk came from.
    pub section_ordinal: usize,
    /// Title of the section this chunk came from.
    pub section: String,
    /// One-based position within the section.
    pub paragraph: usize,
    /// Chunk text.
    pub text: String,
    /// SHA-256 of the chunk text, hex encoded.
    pub chunk_hash: String,
}

/// Chunk every section, assigning global ids and per-section paragraph numbers.
pub fn chunk_sections(
    sections: &[Section],
    settings: &ChunkingSettings,
) -> Result<Vec<Chunk>, ChunkingError> {
    if settings.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    let counter = build_length_counter(settings.unit, &settings.tokenizer_model)?;

    let mut chunks = Vec::new();
    for section in sections {
        let pieces = chunk_text_with_counter(
            &section.text,
            settings.chunk_size,
            settings.overlap,
            counter.clone(),
        );
        tracing::debug!(
            section = %section.title,
            ordinal = section.ordinal,
            chunks = pieces.len(),
            "Chunked section"
        );
        for (index, text) in pieces.into_iter().enumerate() {
            chunks.push(Chunk {
                id: chunks.len(),
                section_ordinal: section.ordinal,
                section: section.title.clone(),
                paragraph: index + 1,
                chunk_hash: compute_chunk_hash(&text),
                text,
            });
        }
    }
    Ok(chunks)
}

/// Chunk a single text with the given settings.
///
/// Returns an empty vector when the input text is all whitespace.
pub fn chunk_text(text: &str, settings: &ChunkingSettings) -> Result<Vec<String>, ChunkingError> {
    if settings.chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let counter = build_length_counter(settings.unit, &settings.tokenizer_model)?;
    Ok(chunk_text_with_counter(
        text,
        settings.chunk_size,
        settings.overlap,
        counter,
    ))
}

/// Deterministic SHA-256 hash of a chunk's text.
pub fn compute_chunk_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the length counter for a unit.
pub(crate) fn build_length_counter(
    unit: ChunkUnit,
    model: &str,
) -> Result<LengthCounter, ChunkingError> {
    match unit {
        ChunkUnit::Characters => Ok(character_counter()),
        ChunkUnit::Tokens => build_tiktoken_counter(model),
    }
}

fn character_counter() -> LengthCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn build_tiktoken_counter(model: &str) -> Result<LengthCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks: Vec<String> = chunker
        .chunk(text)
        .iter()
        .flat_map(|chunk| enforce_bound(chunk, chunk_size, &counter))
        .collect();
    apply_overlap(base_chunks, chunk_size, overlap, &counter)
}

/// Re-split a chunk that exceeds `chunk_size`.
///
/// Cuts at the last whitespace that fits, or mid-word when the fitting prefix has none.
fn enforce_bound(chunk: &str, chunk_size: usize, counter: &LengthCounter) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = chunk.trim();
    while !rest.is_empty() {
        if counter.as_ref()(rest) <= chunk_size {
            pieces.push(rest.to_string());
            break;
        }
        let fit = longest_fitting_prefix(rest, chunk_size, counter);
        let head = &rest[..fit];
        let at_boundary = ends_with_whitespace(head) || starts_with_whitespace(&rest[fit..]);
        let split = if at_boundary {
            fit
        } else {
            match head.rfind(char::is_whitespace) {
                Some(position) if !head[..position].trim().is_empty() => position,
                _ => fit,
            }
        };
        pieces.push(rest[..split].trim_end().to_string());
        rest = rest[split..].trim_start();
    }
    pieces
}

/// Byte length of the longest prefix of `text` within `budget`; at least one character.
fn longest_fitting_prefix(text: &str, budget: usize, counter: &LengthCounter) -> usize {
    let mut fit = 0;
    for (offset, ch) in text.char_indices() {
        let end = offset + ch.len_utf8();
        if counter.as_ref()(&text[..end]) > budget {
            break;
        }
        fit = end;
    }
    if fit == 0 {
        fit = text.chars().next().map_or(0, char::len_utf8);
    }
    fit
}

fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.len() < 2 || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let next = match previous.as_deref() {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, effective_overlap, chunk_size, counter)
            }
            None => current.clone(),
        };
        overlapped.push(next);
        previous = Some(current);
    }
    overlapped
}

/// Prefix `current` with the longest tail of `previous` that keeps the result within
/// `chunk_size`. `current` itself is never shortened.
fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    let room = chunk_size.saturating_sub(counter.as_ref()(current));
    let mut limit = overlap.min(room);
    while limit > 0 {
        let tail = tail_within_limit(previous, limit, counter);
        if tail.is_empty() || starts_mid_word(previous, tail) {
            break;
        }
        let combined = join_overlap(tail, current);
        if counter.as_ref()(&combined) <= chunk_size {
            return combined;
        }
        limit -= 1;
    }
    current.to_string()
}

/// Whether the suffix `tail` of `previous` begins inside a word that has whitespace before it.
fn starts_mid_word(previous: &str, tail: &str) -> bool {
    let head = &previous[..previous.len() - tail.len()];
    head.contains(char::is_whitespace) && head.chars().next_back().is_some_and(|c| !c.is_whitespace())
}

fn join_overlap(tail: &str, current: &str) -> String {
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);
    combined.push_str(tail);
    if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
        combined.push(' ');
    }
    combined.push_str(current);
    combined
}

/// Longest suffix of `text` within `limit`, starting at a word boundary when one exists.
fn tail_within_limit<'a>(text: &'a str, limit: usize, counter: &LengthCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    let trimmed = text.trim_start();
    if counter.as_ref()(trimmed) <= limit {
        return trimmed;
    }

    let suffix = shortest_prefix_cut(text, limit, counter);
    if suffix.is_empty() {
        return suffix;
    }
    let cut = suffix.len();
    let starts_mid_word = text[..text.len() - cut]
        .chars()
        .next_back()
        .is_some_and(|c| !c.is_whitespace());
    if starts_mid_word {
        if let Some(position) = suffix.find(char::is_whitespace) {
            let snapped = suffix[position..].trim_start();
            if !snapped.is_empty() {
                return snapped;
            }
        }
    }
    suffix
}

/// Drop leading characters until the remainder fits `budget`.
fn shortest_prefix_cut<'a>(text: &'a str, budget: usize, counter: &LengthCounter) -> &'a str {
    for (offset, _) in text.char_indices().skip(1) {
        let candidate = text[offset..].trim_start();
        if counter.as_ref()(candidate) <= budget {
            return candidate;
        }
    }
    ""
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitespace_counter() -> LengthCounter {
        Arc::new(|segment: &str| {
            let tokens = segment.split_whitespace().count();
            if tokens == 0 && !segment.is_empty() {
                1
            } else {
                tokens
            }
        })
    }

    fn settings(chunk_size: usize, overlap: usize) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size,
            overlap,
            unit: ChunkUnit::Characters,
            tokenizer_model: String::new(),
        }
    }

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    fn section(ordinal: usize, title: &str, text: &str) -> Section {
        Section {
            ordinal,
            title: title.to_string(),
            heading: None,
            text: text.to_string(),
        }
    }

    #[test]
    fn chunk_text_respects_chunk_size_whitespace_counter() {
        let text = "one two three four five";
        let chunks = chunk_text_with_counter(text, 2, 0, whitespace_counter());
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
    }

    #[test]
    fn chunk_text_with_counter_applies_overlap() {
        let text = "one two three four five";
        let counter = whitespace_counter();
        let chunks = chunk_text_with_counter(text, 3, 1, counter.clone());
        assert_eq!(chunks, vec!["one two three", "three four five"]);
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 3);
        }
    }

    #[test]
    fn chunk_text_handles_empty_input() {
        let chunks = chunk_text("  \n ", &settings(10, 0)).expect("chunks");
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunk_text_rejects_zero_chunk_size() {
        let error = chunk_text("hello", &settings(0, 0)).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn character_chunks_stay_within_bound_and_reconstruct_words() {
        let text = "Retrieval augmented generation grounds answers in documents. \
            Each section is split into bounded chunks.\n\nChunks are embedded and indexed. \
            Questions are embedded too, and the nearest chunks are placed in the prompt.";
        let chunks = chunk_text(text, &settings(60, 0)).expect("chunks");
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 60, "chunk too long: {chunk:?}");
        }
        let rebuilt: Vec<String> = chunks.iter().flat_map(|chunk| words(chunk)).collect();
        assert_eq!(rebuilt, words(text));
    }

    #[test]
    fn overlapped_chunks_stay_within_bound() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu xi \
            omicron pi rho sigma tau upsilon phi chi psi omega";
        let chunks = chunk_text(text, &settings(40, 15)).expect("chunks");
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
        }
        assert!(chunks.last().unwrap().ends_with("omega"));
    }

    const GREEK: &str = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu nu \
        xi omicron pi rho sigma tau upsilon phi chi psi omega";

    #[test]
    fn chunks_stay_within_bound_without_overlap() {
        let chunks = chunk_text(GREEK, &settings(40, 0)).expect("chunks");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
        }
        let rebuilt: Vec<String> = chunks.iter().flat_map(|chunk| words(chunk)).collect();
        assert_eq!(rebuilt, words(GREEK));
    }

    #[test]
    fn overlap_never_cuts_into_chunk_text() {
        let base = chunk_text(GREEK, &settings(40, 0)).expect("base chunks");
        let overlapped = chunk_text(GREEK, &settings(40, 15)).expect("overlapped chunks");
        assert_eq!(base.len(), overlapped.len());
        for (plain, with_overlap) in base.iter().zip(&overlapped) {
            assert!(with_overlap.chars().count() <= 40, "chunk too long: {with_overlap:?}");
            assert!(
                with_overlap.ends_with(plain.as_str()),
                "{with_overlap:?} lost words of {plain:?}"
            );
            let prefix = &with_overlap[..with_overlap.len() - plain.len()];
            let vocabulary = words(GREEK);
            assert!(
                prefix
                    .split_whitespace()
                    .all(|word| vocabulary.iter().any(|known| known == word)),
                "overlap {prefix:?} holds a partial word"
            );
        }
    }

    #[test]
    fn oversized_chunks_are_resplit_at_whitespace() {
        let counter = character_counter();
        let pieces = enforce_bound("alpha beta gamma delta epsilon zeta eta theta", 40, &counter);
        assert_eq!(pieces, vec!["alpha beta gamma delta epsilon zeta eta", "theta"]);

        let pieces = enforce_bound("abcdefghij klm", 4, &counter);
        assert_eq!(pieces, vec!["abcd", "efgh", "ij", "klm"]);
    }

    #[test]
    fn boundary_free_span_is_split_not_dropped() {
        let word = "x".repeat(50);
        let chunks = chunk_text(&word, &settings(20, 0)).expect("chunks");
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
        assert_eq!(chunks.concat(), word);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Sentence one is here. Sentence two follows it. Sentence three ends the paragraph.";
        let first = chunk_text(text, &settings(30, 10)).expect("chunks");
        let second = chunk_text(text, &settings(30, 10)).expect("chunks");
        assert_eq!(first, second);
    }

    #[test]
    fn chunk_sections_assigns_ids_and_paragraphs() {
        let sections = vec![
            section(0, "Introduction", "one two three four five six seven eight"),
            section(1, "Results", "nine ten"),
        ];
        let chunks = chunk_sections(&sections, &settings(15, 0)).expect("chunks");
        let ids: Vec<_> = chunks.iter().map(|chunk| chunk.id).collect();
        assert_eq!(ids, (0..chunks.len()).collect::<Vec<_>>());

        let last = chunks.last().unwrap();
        assert_eq!(last.section, "Results");
        assert_eq!(last.section_ordinal, 1);
        assert_eq!(last.paragraph, 1);

        let intro: Vec<_> = chunks.iter().filter(|c| c.section_ordinal == 0).collect();
        assert!(intro.len() > 1);
        assert_eq!(intro.last().unwrap().paragraph, intro.len());
        assert_eq!(intro[0].chunk_hash, compute_chunk_hash(&intro[0].text));
    }

    #[test]
    fn token_unit_uses_tiktoken_budget() {
        let text = "The quick brown fox jumps over the lazy dog.";
        let token_settings = ChunkingSettings {
            chunk_size: 5,
            overlap: 0,
            unit: ChunkUnit::Tokens,
            tokenizer_model: "gpt-4".into(),
        };
        let chunks = chunk_text(text, &token_settings).expect("chunks");
        let counter = build_tiktoken_counter("gpt-4").unwrap();
        for chunk in &chunks {
            assert!(counter.as_ref()(chunk) <= 5);
        }
        let rebuilt: Vec<String> = chunks.iter().flat_map(|chunk| words(chunk)).collect();
        assert_eq!(rebuilt, words(text));
    }

    #[test]
    fn unknown_tokenizer_model_falls_back_to_cl100k() {
        let counter = build_length_counter(ChunkUnit::Tokens, "mistralai/Devstral-Small-2507")
            .expect("fallback counter");
        assert!(counter.as_ref()("hello world") > 0);
    }

    #[test]
    fn chunk_unit_parses_aliases() {
        assert_eq!("chars".parse::<ChunkUnit>(), Ok(ChunkUnit::Characters));
        assert_eq!("Tokens".parse::<ChunkUnit>(), Ok(ChunkUnit::Tokens));
        assert!("words".parse::<ChunkUnit>().is_err());
    }
}
