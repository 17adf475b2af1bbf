//! Text preprocessing utilities
//!
//! Cleaning and truncation before text is sent to an embedding provider, plus the
//! lightweight term extraction used by the lexical scoring heuristics.

use std::collections::HashSet;

use tracing::debug;

use crate::errors::DeepRagError;
use crate::errors::Result;

/// Upper bound on characters sent to an embedding provider in one call
pub const MAX_EMBEDDING_CHARS: usize = 8000;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "his", "how", "its", "may", "who", "did", "does", "what",
    "when", "where", "which", "why", "with", "this", "that", "these", "those", "from", "into",
    "about", "than", "then", "them", "they", "there", "their", "been", "were", "will", "would",
    "could", "should", "also", "some", "such", "each", "other", "more", "most", "very", "just",
    "over", "only", "between", "tell", "explain", "describe",
];

/// Preprocess text for embedding generation
///
/// Normalizes whitespace, strips control characters and truncates overly long input
/// at a word boundary.
pub fn preprocess_text_for_embedding(text: &str) -> Result<String> {
    if text.is_empty() {
        return Err(DeepRagError::embedding("Empty text provided"));
    }

    let sanitized = sanitize_text(&normalize_whitespace(text));
    if sanitized.is_empty() {
        return Err(DeepRagError::embedding(
            "Text contains only whitespace after preprocessing",
        ));
    }

    let processed = smart_truncate_text(&sanitized, MAX_EMBEDDING_CHARS);
    debug!(
        "Preprocessed text: {} -> {} chars",
        text.len(),
        processed.len()
    );
    Ok(processed)
}

/// Normalize whitespace and newlines
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Replace control characters with spaces and collapse the result
fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Truncate to at most `max_chars` characters, preferring a word boundary
pub fn smart_truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();
    if let Some(last_space) = truncated.rfind(' ') {
        // Only use word boundary if it's not too far back
        if last_space > truncated.len() * 3 / 4 {
            return truncated[..last_space].to_string();
        }
    }
    truncated
}

/// Lowercased content terms of length >= 3 with stopwords removed, in first-seen order
pub fn extract_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Fraction of `query` terms that appear in `candidate`, in `[0, 1]`
pub fn term_overlap(query: &str, candidate: &str) -> f32 {
    let query_terms = extract_terms(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let candidate_terms: HashSet<String> = extract_terms(candidate).into_iter().collect();
    let matched = query_terms
        .iter()
        .filter(|t| candidate_terms.contains(*t))
        .count();
    matched as f32 / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("hello\nworld"), "hello world");
        assert_eq!(normalize_whitespace("hello\r\nworld"), "hello world");
        assert_eq!(normalize_whitespace("hello\tworld"), "hello world");
        assert_eq!(normalize_whitespace("hello   world"), "hello world");
    }

    #[test]
    fn test_sanitize_text() {
        assert_eq!(sanitize_text("hello world!"), "hello world!");
        assert_eq!(sanitize_text("hello\x00world"), "hello world");
        assert_eq!(sanitize_text("héllo wörld 123"), "héllo wörld 123");
    }

    #[test]
    fn test_smart_truncate_is_char_safe() {
        let text = "ünïcödé ".repeat(20);
        let truncated = smart_truncate_text(&text, 30);
        assert!(truncated.chars().count() <= 30);
        assert_eq!(smart_truncate_text("short", 30), "short");
    }

    #[test]
    fn test_preprocess_text_for_embedding() {
        assert_eq!(
            preprocess_text_for_embedding("Hello\nworld!").unwrap(),
            "Hello world!"
        );
        assert!(preprocess_text_for_embedding("").is_err());
        assert!(preprocess_text_for_embedding("   \n\t   ").is_err());
        assert_eq!(
            preprocess_text_for_embedding("Hello\x00world").unwrap(),
            "Hello world"
        );
    }

    #[test]
    fn test_extract_terms_drops_stopwords_and_duplicates() {
        let terms = extract_terms("What is the Capital of France? The capital city!");
        assert_eq!(terms, vec!["capital", "france", "city"]);
    }

    #[test]
    fn test_term_overlap() {
        let overlap = term_overlap("rust memory safety", "Rust guarantees memory safety.");
        assert!((overlap - 1.0).abs() < f32::EPSILON);
        let overlap = term_overlap("rust memory safety", "Python is dynamically typed");
        assert!(overlap.abs() < f32::EPSILON);
        assert!(term_overlap("the and", "anything").abs() < f32::EPSILON);
    }
}
