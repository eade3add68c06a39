//! Small text helpers shared by the summarizer, quiz generator, and retrieval steps.

use std::collections::HashSet;

/// Longest prefix of `text` holding at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

pub(crate) fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keep at most `max_words` words, appending `...` when anything was dropped.
pub(crate) fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    let mut capped = words[..max_words].join(" ");
    capped.push_str("...");
    capped
}

/// Lowercased words with surrounding punctuation stripped.
pub(crate) fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Number of distinct words two texts share.
pub(crate) fn shared_words(left: &str, right: &str) -> usize {
    let right = word_set(right);
    word_set(left).intersection(&right).count()
}
