//! Prompt templates for generation calls made by the strategies

use crate::errors::DeepRagError;
use crate::errors::Result;

/// A `{{name}}`-placeholder template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: &'static str,
    variables: Vec<String>,
}

impl PromptTemplate {
    #[must_use]
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            variables: placeholders(template),
        }
    }

    /// Substitute every placeholder; a placeholder without a value is an error
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        let mut rendered = self.template.to_string();
        for name in &self.variables {
            let value = values
                .iter()
                .find(|(key, _)| *key == name.as_str())
                .map(|(_, value)| *value)
                .ok_or_else(|| {
                    DeepRagError::Validation(format!("prompt variable '{name}' was not supplied"))
                })?;
            rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
        }
        Ok(rendered)
    }

    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

/// Names between `{{` and `}}`, first occurrence order
fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let name = &after[..close];
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[close + 2..];
    }
    names
}

/// Prompts used across the strategies
pub struct RagPrompts;

impl RagPrompts {
    /// Grounded answer with inline `[n]` citations
    #[must_use]
    pub fn answer_with_citations() -> PromptTemplate {
        PromptTemplate::new(
            r"Answer the question using only the numbered sources below.
Cite the sources you rely on inline as [1], [2], ... .
If the sources do not contain the answer, say that the information is insufficient.

Sources:
{{context}}

Question: {{question}}

Answer:",
        )
    }

    /// Summary of one RAPTOR cluster
    #[must_use]
    pub fn cluster_summary() -> PromptTemplate {
        PromptTemplate::new(
            r"Summarize the following related passages into one concise paragraph.
Keep the key facts, names and figures; do not add information that is not present.

Passages:
{{passages}}

Summary:",
        )
    }

    /// Compress a reranked evidence set for one research sub-question
    #[must_use]
    pub fn distill() -> PromptTemplate {
        PromptTemplate::new(
            r"Extract the facts relevant to the question from the evidence below.
Return a compact list of findings, each one sentence, citing [n] where it comes from.

Question: {{question}}

Evidence:
{{evidence}}

Findings:",
        )
    }

    /// Final answer over the collected research steps
    #[must_use]
    pub fn synthesis() -> PromptTemplate {
        PromptTemplate::new(
            r"You researched the question below in several steps. Using only these findings,
write a complete, well-structured answer. Point out gaps where the findings are thin.

Question: {{question}}

Research findings:
{{findings}}

Answer:",
        )
    }

    /// LLM-backed policy judgement for the research loop
    #[must_use]
    pub fn policy_judge() -> PromptTemplate {
        PromptTemplate::new(
            r"You supervise a multi-step research process.

Question: {{question}}

Plan:
{{plan}}

Findings so far:
{{history}}

Next planned step: {{next_step}}

Decide whether to CONTINUE with the next step, REVISE the plan because the findings
contradict it, or FINISH because the findings already answer the question.
Reply in exactly this format:
ACTION: <CONTINUE|REVISE|FINISH>
CONFIDENCE: <number between 0 and 1>
REASON: <one sentence>",
        )
    }
}
