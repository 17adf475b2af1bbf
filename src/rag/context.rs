//! Context assembly from retrieved sources

use serde::Serialize;

use crate::embeddings::text_preprocessing::smart_truncate_text;
use crate::models::RagSource;

/// Citation marker `[n]` and the source it stands for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub marker: usize,
    pub source_id: Option<String>,
    pub score: f32,
}

/// Builds generation context within a byte budget
#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_context_length: usize,
}

impl ContextAssembler {
    #[must_use]
    pub const fn new(max_context_length: usize) -> Self {
        Self { max_context_length }
    }

    /// Plain context, sources separated by blank lines
    #[must_use]
    pub fn assemble(&self, sources: &[RagSource]) -> String {
        let entries = sources.iter().map(|s| s.text.trim().to_string());
        self.pack(entries, "\n\n").0
    }

    /// Context with `[n]` markers, plus the markers that made it into the budget
    #[must_use]
    pub fn assemble_with_citations(&self, sources: &[RagSource]) -> (String, Vec<Citation>) {
        let entries = sources
            .iter()
            .enumerate()
            .map(|(idx, s)| format!("[{}] {}", idx + 1, s.text.trim()));
        let (context, included) = self.pack(entries, "\n\n");

        let citations = sources
            .iter()
            .take(included)
            .enumerate()
            .map(|(idx, s)| Citation {
                marker: idx + 1,
                source_id: s.id().map(str::to_string),
                score: s.score,
            })
            .collect();
        (context, citations)
    }

    /// Entries in order until the budget is reached; an oversized first entry is
    /// truncated rather than dropped so context is never empty when sources exist
    fn pack(&self, entries: impl Iterator<Item = String>, separator: &str) -> (String, usize) {
        let mut context = String::new();
        let mut included = 0;

        for entry in entries {
            let needed = if context.is_empty() {
                entry.len()
            } else {
                separator.len() + entry.len()
            };

            if context.len() + needed > self.max_context_length {
                if context.is_empty() {
                    context = smart_truncate_text(&entry, self.max_context_length);
                    included = 1;
                }
                break;
            }

            if !context.is_empty() {
                context.push_str(separator);
            }
            context.push_str(&entry);
            included += 1;
        }

        (context, included)
    }

    /// Human-readable overview of the sources, at most five listed
    #[must_use]
    pub fn create_summary(&self, sources: &[RagSource]) -> String {
        if sources.is_empty() {
            return "No sources found.".to_string();
        }

        let mut summary = format!("Found {} relevant source(s):\n\n", sources.len());
        for (idx, source) in sources.iter().enumerate().take(5) {
            let preview = smart_truncate_text(source.text.trim(), 100);
            summary.push_str(&format!(
                "{}. {} - Score: {:.2}\n   {}\n\n",
                idx + 1,
                source.id().unwrap_or("unknown"),
                source.score,
                preview
            ));
        }
        summary
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(8000)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn source(id: &str, text: &str, score: f32) -> RagSource {
        RagSource {
            text: text.to_string(),
            score,
            metadata: json!({ "id": id }).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_assemble_joins_sources() {
        let assembler = ContextAssembler::new(1000);
        let context = assembler.assemble(&[source("a", "First.", 0.9), source("b", "Second.", 0.8)]);
        assert_eq!(context, "First.\n\nSecond.");
    }

    #[test]
    fn test_citations_respect_budget() {
        let assembler = ContextAssembler::new(30);
        let sources = vec![
            source("a", "Alpha source text.", 0.9),
            source("b", "Beta source text that will not fit.", 0.8),
        ];
        let (context, citations) = assembler.assemble_with_citations(&sources);
        assert_eq!(context, "[1] Alpha source text.");
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].marker, 1);
        assert_eq!(citations[0].source_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_oversized_first_source_is_truncated() {
        let assembler = ContextAssembler::new(20);
        let context = assembler.assemble(&[source("a", &"long words ".repeat(10), 0.5)]);
        assert!(!context.is_empty());
        assert!(context.len() <= 20);
    }

    #[test]
    fn test_create_summary() {
        let assembler = ContextAssembler::default();
        assert_eq!(assembler.create_summary(&[]), "No sources found.");
        let summary = assembler.create_summary(&[source("doc:chunk-0000", "Some text", 0.42)]);
        assert!(summary.starts_with("Found 1 relevant source(s)"));
        assert!(summary.contains("doc:chunk-0000 - Score: 0.42"));
    }
}
