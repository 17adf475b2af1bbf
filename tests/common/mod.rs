#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deeprag::embeddings::HashEmbedder;
use deeprag::llm::ExtractiveGenerator;
use deeprag::models::Capabilities;
use deeprag::models::Metadata;
use deeprag::models::RagConfig;
use deeprag::models::RagMode;
use deeprag::models::RagResult;
use deeprag::models::Tier;
use deeprag::rag::GenerationInput;
use deeprag::vector_store::InMemoryVectorStore;
use deeprag::AppConfig;
use deeprag::Providers;
use deeprag::RagStrategy;
use deeprag::StrategyRegistry;

pub const DIMENSION: usize = 256;

pub const THEMES: [&str; 5] = [
    "Volcanic eruptions push molten magma, ash and hot gas up through cracks in the crust of the earth.",
    "Jazz musicians improvise melodies over swing rhythms, blues scales and extended chord changes.",
    "Honeybee colonies store nectar as honey inside wax combs built by thousands of worker bees.",
    "Glaciers carve deep valleys as compacted ice slowly flows downhill under its own great weight.",
    "Compilers translate source code into machine instructions after parsing and type checking it.",
];

/// `paragraphs` blank-line separated paragraphs cycling through [`THEMES`]
pub fn themed_document(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| format!("{} Observation number {i}.", THEMES[i % THEMES.len()]))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Defaults tuned so every themed paragraph becomes exactly one chunk
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rag.chunk_size = 160;
    config.rag.overlap = 0;
    config.embeddings.dimension = DIMENSION;
    config
}

pub fn offline_providers() -> Providers {
    Providers::new(
        Arc::new(HashEmbedder::new(DIMENSION)),
        Arc::new(ExtractiveGenerator::default()),
        Arc::new(InMemoryVectorStore::new()),
        4,
        Duration::from_secs(10),
    )
}

pub fn offline_registry(config: AppConfig) -> StrategyRegistry {
    StrategyRegistry::new(config, offline_providers())
}

/// Strategy whose every operation fails
pub struct BrokenStrategy {
    config: RagConfig,
}

impl BrokenStrategy {
    pub fn new(mode: RagMode) -> Self {
        Self {
            config: RagConfig::new(mode),
        }
    }
}

#[async_trait]
impl RagStrategy for BrokenStrategy {
    fn config(&self) -> &RagConfig {
        &self.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "Broken".to_string(),
            mode: self.config.mode,
            features: Vec::new(),
            complexity: Tier::Low,
            resource_usage: Tier::Low,
        }
    }

    async fn store(&self, _content: &str, _user_id: &str, _metadata: &Metadata) -> RagResult {
        RagResult::failure(self.config.mode, "backend offline")
    }

    async fn retrieve(&self, _query: &str, _user_id: &str, _top_k: Option<usize>, _filters: &Metadata) -> RagResult {
        RagResult::failure(self.config.mode, "backend offline")
    }

    async fn generate(&self, _query: &str, _user_id: &str, _input: GenerationInput<'_>) -> RagResult {
        RagResult::failure(self.config.mode, "backend offline")
    }
}
