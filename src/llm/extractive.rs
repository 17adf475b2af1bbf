//! Offline generator that answers by selecting sentences from the prompt's evidence
//!
//! Recognizes the evidence sections of the built-in [`RagPrompts`](super::RagPrompts)
//! and returns the sentences that best overlap the `Question:` line, in source order.

use async_trait::async_trait;

use super::TextGenerator;
use crate::embeddings::term_overlap;
use crate::errors::DeepRagError;
use crate::errors::Result;

const EVIDENCE_HEADERS: &[&str] = &[
    "Sources:",
    "Passages:",
    "Evidence:",
    "Research findings:",
    "Findings so far:",
];

const SECTION_ENDS: &[&str] = &[
    "Question:",
    "Answer:",
    "Summary:",
    "Findings:",
    "Next planned step:",
];

#[derive(Debug, Clone)]
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    #[must_use]
    pub fn new(max_sentences: usize) -> Self {
        Self {
            max_sentences: max_sentences.max(1),
        }
    }

    fn question(prompt: &str) -> Option<&str> {
        prompt
            .lines()
            .find_map(|line| line.trim().strip_prefix("Question:"))
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    fn evidence(prompt: &str) -> String {
        let mut capturing = false;
        let mut evidence = Vec::new();
        for line in prompt.lines() {
            let trimmed = line.trim();
            if EVIDENCE_HEADERS.contains(&trimmed) {
                capturing = true;
                continue;
            }
            if SECTION_ENDS.iter().any(|end| trimmed.starts_with(end)) {
                capturing = false;
                continue;
            }
            if capturing && !trimmed.is_empty() {
                evidence.push(trimmed);
            }
        }
        evidence.join(" ")
    }

    /// Build the extractive answer; `None` when the prompt carries no evidence
    #[must_use]
    pub fn extract(&self, prompt: &str) -> Option<String> {
        let evidence = Self::evidence(prompt);
        let sentences = split_sentences(&evidence);
        if sentences.is_empty() {
            return None;
        }

        let mut picked: Vec<usize> = match Self::question(prompt) {
            Some(question) => {
                let mut scored: Vec<(usize, f32)> = sentences
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (i, term_overlap(question, s)))
                    .collect();
                scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                scored
                    .into_iter()
                    .take(self.max_sentences)
                    .map(|(i, _)| i)
                    .collect()
            }
            None => (0..sentences.len().min(self.max_sentences)).collect(),
        };
        picked.sort_unstable();

        Some(
            picked
                .into_iter()
                .map(|i| sentences[i])
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.peek().map_or(true, |(_, next)| next.is_whitespace());
        if at_boundary {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

#[async_trait]
impl TextGenerator for ExtractiveGenerator {
    async fn generate_text(&self, prompt: &str, _temperature: f32, max_tokens: usize) -> Result<String> {
        let answer = self
            .extract(prompt)
            .ok_or_else(|| DeepRagError::generation("prompt contains no evidence to extract from"))?;
        // Roughly four characters per token
        Ok(crate::embeddings::text_preprocessing::smart_truncate_text(
            &answer,
            max_tokens.saturating_mul(4).max(1),
        ))
    }
}
