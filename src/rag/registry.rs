//! Lazily constructed strategy instances and multi-strategy queries

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::json;
use serde_json::Value;
use tracing::info;
use tracing::warn;

use super::basic::BasicRag;
use super::crag::CragRag;
use super::deep_thinking::DeepThinkingRag;
use super::raptor::RaptorRag;
use super::recommender::ModeRecommender;
use super::strategy::GenerationSettings;
use super::strategy::RagStrategy;
use super::strategy::StrategyCore;
use crate::config::AppConfig;
use crate::models::Capabilities;
use crate::models::ModeRecommendation;
use crate::models::RagMode;
use crate::models::RagResult;
use crate::models::RagSource;
use crate::providers::Providers;

/// Instance id used when the caller does not name one
pub const DEFAULT_INSTANCE: &str = "default";

/// Maps `(mode, instance_id)` to a strategy, building on first use
pub struct StrategyRegistry {
    config: AppConfig,
    providers: Providers,
    recommender: ModeRecommender,
    instances: DashMap<(RagMode, String), Arc<dyn RagStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry; strategies are built on first request
    #[must_use]
    pub fn new(config: AppConfig, providers: Providers) -> Self {
        Self {
            config,
            providers,
            recommender: ModeRecommender::new(),
            instances: DashMap::new(),
        }
    }

    #[must_use]
    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    fn build(&self, mode: RagMode) -> Arc<dyn RagStrategy> {
        let core = StrategyCore::new(
            self.config.rag_config(mode),
            self.providers.clone(),
            GenerationSettings::from_app_config(&self.config),
        );
        info!("Creating {} strategy", mode);
        match mode {
            RagMode::Basic => Arc::new(BasicRag::new(core)),
            RagMode::Raptor => Arc::new(RaptorRag::new(core, self.config.raptor.clone())),
            RagMode::Crag => Arc::new(CragRag::new(core, self.config.crag.clone())),
            RagMode::DeepThinking => {
                Arc::new(DeepThinkingRag::new(core, self.config.deep_thinking.clone()))
            }
        }
    }

    /// Cached instance for `(mode, instance_id)`; the same `Arc` is returned on every call
    pub fn get_or_create(&self, mode: RagMode, instance_id: &str) -> Arc<dyn RagStrategy> {
        self.instances
            .entry((mode, instance_id.to_string()))
            .or_insert_with(|| self.build(mode))
            .value()
            .clone()
    }

    /// Install a custom strategy, replacing any cached one
    pub fn register(&self, mode: RagMode, instance_id: &str, strategy: Arc<dyn RagStrategy>) {
        self.instances.insert((mode, instance_id.to_string()), strategy);
    }

    /// Every mode the registry can build
    #[must_use]
    pub fn available_modes(&self) -> Vec<RagMode> {
        RagMode::ALL.to_vec()
    }

    /// Capabilities of the default instance of every mode
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capabilities> {
        self.available_modes()
            .into_iter()
            .map(|mode| self.get_or_create(mode, DEFAULT_INSTANCE).capabilities())
            .collect()
    }

    /// Suggest a mode for `query`; never fails
    #[must_use]
    pub fn recommend_mode(&self, query: &str) -> ModeRecommendation {
        self.recommender.recommend(query)
    }

    /// Run `query` on every requested mode concurrently
    ///
    /// Succeeds when at least one mode succeeds; failed modes are listed under
    /// `failed_results` instead of failing the call.
    pub async fn hybrid_query(&self, query: &str, user_id: &str, modes: &[RagMode]) -> RagResult {
        let started = Instant::now();
        let mut requested: Vec<RagMode> = Vec::with_capacity(modes.len());
        for mode in modes {
            if !requested.contains(mode) {
                requested.push(*mode);
            }
        }
        let Some(&first) = requested.first() else {
            return RagResult::failure(RagMode::Basic, "hybrid query needs at least one mode");
        };

        let mut pending: FuturesUnordered<_> = requested
            .iter()
            .map(|&mode| {
                let strategy = self.get_or_create(mode, DEFAULT_INSTANCE);
                async move { (mode, strategy.query(query, user_id).await) }
            })
            .collect();

        let mut sections = Vec::new();
        let mut sources: Vec<RagSource> = Vec::new();
        let mut successful: Vec<RagMode> = Vec::new();
        let mut failed = Vec::new();
        let mut per_mode = serde_json::Map::new();

        while let Some((mode, result)) = pending.next().await {
            if result.success {
                sections.push(format!("## {}\n{}", mode, result.content.trim()));
                sources.extend(result.sources.into_iter().map(|mut source| {
                    source.metadata.insert("mode".to_string(), json!(mode.as_str()));
                    source
                }));
                per_mode.insert(mode.as_str().to_string(), Value::Object(result.metadata));
                successful.push(mode);
            } else {
                let error = result.error.unwrap_or_else(|| "unknown error".to_string());
                warn!("Hybrid branch {} failed: {}", mode, error);
                failed.push(json!({ "mode": mode.as_str(), "error": error }));
            }
        }

        info!(
            "Hybrid query finished: {} succeeded, {} failed",
            successful.len(),
            failed.len()
        );

        let mut result = match successful.first() {
            Some(&mode) => RagResult::success(mode)
                .with_content(sections.join("\n\n"))
                .with_sources(sources),
            None => RagResult::failure(first, "every requested mode failed"),
        };
        result = result
            .with_metadata(
                "successful_modes",
                successful.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
            )
            .with_metadata("failed_results", Value::Array(failed))
            .with_metadata("results", Value::Object(per_mode));
        result.timed(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::tests::offline_providers;
    use crate::tests::FailingStrategy;

    const DOC: &str = "Honeybees communicate the location of flowers with a waggle dance.\n\n\
                       A colony relies on a single queen that lays all of the eggs.\n\n\
                       Worker bees produce wax and build hexagonal comb cells.";

    fn registry() -> StrategyRegistry {
        StrategyRegistry::new(AppConfig::default(), offline_providers())
    }

    #[test]
    fn test_instances_are_cached() {
        let registry = registry();
        let a = registry.get_or_create(RagMode::Crag, "tenant-a");
        let b = registry.get_or_create(RagMode::Crag, "tenant-a");
        let c = registry.get_or_create(RagMode::Crag, "tenant-b");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(a.mode(), RagMode::Crag);
    }

    #[test]
    fn test_capabilities_cover_every_mode() {
        let capabilities = registry().capabilities();
        let modes: Vec<RagMode> = capabilities.iter().map(|c| c.mode).collect();
        assert_eq!(modes, RagMode::ALL.to_vec());
    }

    #[test]
    fn test_recommend_mode() {
        let recommendation = registry().recommend_mode("Give an overview of the main themes");
        assert_eq!(recommendation.mode, RagMode::Raptor);
    }

    #[tokio::test]
    async fn test_hybrid_query_survives_failing_mode() {
        let registry = registry();
        registry.register(
            RagMode::Crag,
            DEFAULT_INSTANCE,
            Arc::new(FailingStrategy::new(RagMode::Crag)),
        );
        let stored = registry
            .get_or_create(RagMode::Basic, DEFAULT_INSTANCE)
            .store(DOC, "alice", &Metadata::new())
            .await;
        assert!(stored.success);

        let result = registry
            .hybrid_query("How do honeybees communicate?", "alice", &[RagMode::Basic, RagMode::Crag])
            .await;
        assert!(result.success);
        assert_eq!(result.metadata["successful_modes"], json!(["basic"]));
        let failed = result.metadata["failed_results"].as_array().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["mode"], json!("crag"));
        assert!(result.content.starts_with("## basic"));
        assert!(result.sources.iter().all(|s| s.metadata["mode"] == json!("basic")));
    }

    #[tokio::test]
    async fn test_hybrid_query_all_failed() {
        let registry = registry();
        registry.register(RagMode::Basic, DEFAULT_INSTANCE, Arc::new(FailingStrategy::new(RagMode::Basic)));
        let result = registry.hybrid_query("anything", "alice", &[RagMode::Basic]).await;
        assert!(!result.success);
        assert_eq!(result.metadata["failed_results"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hybrid_query_requires_modes() {
        let result = registry().hybrid_query("anything", "alice", &[]).await;
        assert!(!result.success);
    }
}
