//! Plain vector-lookup strategy

use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::strategy::GenerationInput;
use super::strategy::RagStrategy;
use super::strategy::StrategyCore;
use crate::embeddings::term_overlap;
use crate::models::Capabilities;
use crate::models::Metadata;
use crate::models::RagConfig;
use crate::models::RagResult;
use crate::models::RagSource;
use crate::models::Tier;

const RERANK_SIMILARITY_WEIGHT: f32 = 0.7;
const RERANK_OVERLAP_WEIGHT: f32 = 0.3;

/// Single vector lookup per query, optionally reranked by term overlap
pub struct BasicRag {
    core: StrategyCore,
}

impl BasicRag {
    /// Create a basic strategy over the shared core
    #[must_use]
    pub fn new(core: StrategyCore) -> Self {
        Self { core }
    }
}

/// Re-sort by a blend of vector similarity and query term overlap
pub fn rerank(query: &str, sources: &mut [RagSource]) {
    for source in sources.iter_mut() {
        let similarity = source.score;
        let overlap = term_overlap(query, &source.text);
        source.metadata.insert("similarity".to_string(), json!(similarity));
        source.score = RERANK_SIMILARITY_WEIGHT * similarity + RERANK_OVERLAP_WEIGHT * overlap;
    }
    sources.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[async_trait]
impl RagStrategy for BasicRag {
    fn config(&self) -> &RagConfig {
        &self.core.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "Basic RAG".to_string(),
            mode: self.core.config.mode,
            features: vec![
                "vector_search".to_string(),
                "citations".to_string(),
                "optional_rerank".to_string(),
            ],
            complexity: Tier::Low,
            resource_usage: Tier::Low,
        }
    }

    async fn store(&self, content: &str, user_id: &str, metadata: &Metadata) -> RagResult {
        let started = Instant::now();
        if let Err(e) = StrategyCore::validate_request(content, user_id, "content") {
            return RagResult::failure(self.mode(), e.to_string());
        }
        let outcome = self.core.store_chunks(content, user_id, metadata).await;
        self.core.store_result(outcome, started)
    }

    async fn retrieve(&self, query: &str, user_id: &str, top_k: Option<usize>, filters: &Metadata) -> RagResult {
        let started = Instant::now();
        let mode = self.mode();
        if let Err(e) = StrategyCore::validate_request(query, user_id, "query") {
            return RagResult::failure(mode, e.to_string());
        }

        let top_k = self.core.top_k(top_k);
        let filter = StrategyCore::filter(user_id, filters);
        let hits = match self.core.vector_search(query, &filter, top_k).await {
            Ok(hits) => hits,
            Err(e) => return RagResult::failure(mode, e.to_string()).timed(started),
        };

        let candidates = hits.len();
        let threshold = self.core.config.similarity_threshold;
        let mut sources: Vec<RagSource> = hits
            .into_iter()
            .filter(|hit| hit.score >= threshold)
            .map(crate::vector_store::SearchHit::into_source)
            .collect();
        if self.core.config.enable_rerank {
            rerank(query, &mut sources);
        }
        debug!(
            "Basic retrieval kept {}/{} hits at threshold {}",
            sources.len(),
            candidates,
            threshold
        );

        RagResult::success(mode)
            .with_sources(sources)
            .with_metadata("candidates", candidates)
            .with_metadata("reranked", self.core.config.enable_rerank)
            .timed(started)
    }

    async fn generate(&self, query: &str, _user_id: &str, input: GenerationInput<'_>) -> RagResult {
        self.core.answer(query, input).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::models::RagMode;
    use crate::rag::strategy::GenerationSettings;
    use crate::tests::offline_providers;
    use crate::tests::providers_with;
    use crate::tests::ScriptedGenerator;

    const DOC: &str = "The Amazon river flows through Brazil and carries more water than any other river.\n\n\
                       Mount Everest is the highest mountain above sea level, located in the Himalayas.\n\n\
                       The Sahara is the largest hot desert, covering much of North Africa.";

    fn basic(config: RagConfig, providers: crate::providers::Providers) -> BasicRag {
        BasicRag::new(StrategyCore::new(config, providers, GenerationSettings::default()))
    }

    fn small_chunks() -> RagConfig {
        RagConfig {
            chunk_size: 100,
            overlap: 10,
            top_k: 2,
            ..RagConfig::new(RagMode::Basic)
        }
    }

    #[tokio::test]
    async fn test_store_then_query_round_trip() {
        let strategy = basic(small_chunks(), offline_providers());
        let stored = strategy.store(DOC, "alice", &Metadata::new()).await;
        assert!(stored.success, "{:?}", stored.error);
        assert_eq!(stored.metadata["chunks"], json!(3));

        let result = strategy.query("Which river flows through Brazil?", "alice").await;
        assert!(result.success);
        assert!(result.content.contains("Amazon"));
        assert!(result.sources[0].text.contains("Amazon"));
        assert!(result.metadata.contains_key("retrieval"));
    }

    #[tokio::test]
    async fn test_retrieve_is_user_scoped() {
        let strategy = basic(small_chunks(), offline_providers());
        strategy.store(DOC, "alice", &Metadata::new()).await;
        let result = strategy
            .retrieve("Amazon river", "bob", None, &Metadata::new())
            .await;
        assert!(result.success);
        assert!(result.sources.is_empty());
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn test_similarity_threshold_and_top_k() {
        let config = RagConfig {
            similarity_threshold: 0.99,
            ..small_chunks()
        };
        let strategy = basic(config, offline_providers());
        strategy.store(DOC, "alice", &Metadata::new()).await;
        let result = strategy
            .retrieve("Amazon river", "alice", Some(3), &Metadata::new())
            .await;
        assert!(result.sources.is_empty());
        assert_eq!(result.metadata["candidates"], json!(3));
    }

    #[tokio::test]
    async fn test_rerank_records_similarity() {
        let config = RagConfig {
            enable_rerank: true,
            ..small_chunks()
        };
        let strategy = basic(
            config,
            providers_with(
                Arc::new(HashEmbedder::new(64)),
                Arc::new(ScriptedGenerator::new("answer")),
            ),
        );
        strategy.store(DOC, "alice", &Metadata::new()).await;
        let result = strategy
            .retrieve("highest mountain Himalayas", "alice", None, &Metadata::new())
            .await;
        assert!(result.sources[0].text.contains("Everest"));
        assert!(result.sources[0].metadata.contains_key("similarity"));
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected_before_io() {
        let strategy = basic(small_chunks(), offline_providers());
        let result = strategy.query("   ", "alice").await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Validation"));
    }
}
