//! Three-stage retrieval funnel: broad recall, rerank, optional distillation

use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::embeddings::term_overlap;
use crate::llm::RagPrompts;
use crate::models::RagSource;
use crate::providers::Providers;
use crate::rag::context::ContextAssembler;
use crate::rag::strategy::GenerationSettings;
use crate::vector_store::SearchHit;

const SIMILARITY_WEIGHT: f32 = 0.6;
const OVERLAP_WEIGHT: f32 = 0.4;

#[derive(Debug, Clone, Default)]
pub struct FunnelOutput {
    /// Candidates entering the rerank stage
    pub recalled: usize,
    /// Best candidates after reranking, best first
    pub kept: Vec<RagSource>,
    pub summary: String,
    pub quality: f32,
    /// Distillation was attempted and failed
    pub distillation_failed: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievalFunnel {
    rerank_k: usize,
    enable_distillation: bool,
    assembler: ContextAssembler,
    settings: GenerationSettings,
}

impl RetrievalFunnel {
    /// Create a funnel keeping `rerank_k` sources per step
    #[must_use]
    pub fn new(
        rerank_k: usize,
        enable_distillation: bool,
        assembler: ContextAssembler,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            rerank_k: rerank_k.max(1),
            enable_distillation,
            assembler,
            settings,
        }
    }

    /// Score by `0.6 * similarity + 0.4 * term overlap` and keep the best `rerank_k`
    #[must_use]
    pub fn rerank(&self, sub_question: &str, recalled: Vec<SearchHit>) -> Vec<RagSource> {
        let mut sources: Vec<RagSource> = recalled
            .into_iter()
            .map(|hit| {
                let similarity = hit.score;
                let overlap = term_overlap(sub_question, &hit.text);
                let rerank_score = SIMILARITY_WEIGHT * similarity + OVERLAP_WEIGHT * overlap;
                let mut source = hit.into_source();
                source.metadata.insert("similarity".to_string(), json!(similarity));
                source.metadata.insert("rerank_score".to_string(), json!(rerank_score));
                source.score = rerank_score;
                source
            })
            .collect();
        sources.sort_by(|a, b| b.score.total_cmp(&a.score));
        sources.truncate(self.rerank_k);
        sources
    }

    /// Mean over kept sources of the mean of similarity and rerank score
    #[must_use]
    pub fn quality(kept: &[RagSource]) -> f32 {
        if kept.is_empty() {
            return 0.0;
        }
        let total: f32 = kept
            .iter()
            .map(|source| {
                let similarity = source
                    .metadata
                    .get("similarity")
                    .and_then(serde_json::Value::as_f64)
                    .map_or(source.score, |v| v as f32);
                (similarity + source.score) / 2.0
            })
            .sum();
        (total / kept.len() as f32).clamp(0.0, 1.0)
    }

    /// Rerank the recalled hits and distill them into a step summary
    pub async fn run(&self, providers: &Providers, sub_question: &str, recalled: Vec<SearchHit>) -> FunnelOutput {
        let recalled_count = recalled.len();
        let kept = self.rerank(sub_question, recalled);
        let quality = Self::quality(&kept);
        debug!(
            "Funnel kept {}/{} candidates, quality {:.3}",
            kept.len(),
            recalled_count,
            quality
        );

        if kept.is_empty() {
            return FunnelOutput {
                recalled: recalled_count,
                ..FunnelOutput::default()
            };
        }

        let concatenated = self.assembler.assemble(&kept);
        let (summary, distillation_failed) = if self.enable_distillation {
            match self.distill(providers, sub_question, &kept).await {
                Some(summary) => (summary, false),
                None => (concatenated, true),
            }
        } else {
            (concatenated, false)
        };

        FunnelOutput {
            recalled: recalled_count,
            kept,
            summary,
            quality,
            distillation_failed,
        }
    }

    async fn distill(&self, providers: &Providers, sub_question: &str, kept: &[RagSource]) -> Option<String> {
        let (evidence, _) = self.assembler.assemble_with_citations(kept);
        let prompt = match RagPrompts::distill()
            .render(&[("question", sub_question), ("evidence", evidence.as_str())])
        {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!("Could not render distillation prompt: {}", e);
                return None;
            }
        };
        match providers
            .generate(&prompt, self.settings.temperature, self.settings.max_tokens)
            .await
        {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!("Distillation failed, keeping raw evidence: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::models::Metadata;
    use crate::tests::offline_providers;
    use crate::tests::providers_with;
    use crate::tests::FailingGenerator;
    use crate::tests::ScriptedGenerator;

    fn hit(id: &str, text: &str, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            text: text.to_string(),
            score,
            metadata: Metadata::new(),
        }
    }

    fn recalled() -> Vec<SearchHit> {
        vec![
            hit("a", "Volcanoes erupt when magma pressure builds beneath the crust.", 0.5),
            hit("b", "Jazz improvisation grew out of blues and ragtime.", 0.55),
            hit("c", "Magma chambers feed volcanic eruptions over long periods.", 0.45),
        ]
    }

    fn funnel(rerank_k: usize, distill: bool) -> RetrievalFunnel {
        RetrievalFunnel::new(rerank_k, distill, ContextAssembler::default(), GenerationSettings::default())
    }

    #[test]
    fn test_rerank_blends_overlap() {
        let kept = funnel(2, false).rerank("why do volcanoes erupt magma", recalled());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id(), Some("a"));
        assert!(kept.iter().all(|s| s.metadata.contains_key("rerank_score")));
        assert!(kept.iter().all(|s| s.id() != Some("b")));
    }

    #[test]
    fn test_quality_bounds() {
        assert_eq!(RetrievalFunnel::quality(&[]), 0.0);
        let kept = funnel(3, false).rerank("volcanoes magma", recalled());
        let quality = RetrievalFunnel::quality(&kept);
        assert!(quality > 0.0 && quality <= 1.0);
    }

    #[tokio::test]
    async fn test_distillation_uses_generator() {
        let generator = Arc::new(ScriptedGenerator::new("Magma pressure drives eruptions [1]."));
        let providers = providers_with(Arc::new(HashEmbedder::default()), generator.clone());
        let output = funnel(2, true).run(&providers, "why do volcanoes erupt", recalled()).await;
        assert_eq!(output.recalled, 3);
        assert_eq!(output.summary, "Magma pressure drives eruptions [1].");
        assert!(!output.distillation_failed);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_distillation_failure_falls_back_to_evidence() {
        let providers = providers_with(Arc::new(HashEmbedder::default()), Arc::new(FailingGenerator));
        let output = funnel(2, true).run(&providers, "volcanoes magma", recalled()).await;
        assert!(output.distillation_failed);
        assert!(output.summary.contains("magma"));
    }

    #[tokio::test]
    async fn test_empty_recall() {
        let output = funnel(2, true).run(&offline_providers(), "anything", Vec::new()).await;
        assert_eq!(output.recalled, 0);
        assert!(output.kept.is_empty());
        assert!(output.summary.is_empty());
        assert_eq!(output.quality, 0.0);
    }
}
