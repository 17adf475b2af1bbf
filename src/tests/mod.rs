//! Shared doubles for unit tests

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::embeddings::Embedder;
use crate::embeddings::HashEmbedder;
use crate::errors::DeepRagError;
use crate::errors::Result;
use crate::llm::ExtractiveGenerator;
use crate::llm::TextGenerator;
use crate::models::Capabilities;
use crate::models::Metadata;
use crate::models::RagConfig;
use crate::models::RagMode;
use crate::models::RagResult;
use crate::models::Tier;
use crate::providers::Providers;
use crate::rag::GenerationInput;
use crate::rag::RagStrategy;
use crate::vector_store::InMemoryVectorStore;

pub const TEST_DIMENSION: usize = 128;

/// Returns the same completion for every prompt and counts calls
pub struct ScriptedGenerator {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate_text(&self, _prompt: &str, _temperature: f32, _max_tokens: usize) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate_text(&self, _prompt: &str, _temperature: f32, _max_tokens: usize) -> Result<String> {
        Err(DeepRagError::generation("scripted failure"))
    }
}

/// Fails for any text containing `poison`, otherwise delegates to a hash embedder
pub struct PoisonEmbedder {
    inner: HashEmbedder,
    poison: String,
}

impl PoisonEmbedder {
    pub fn new(poison: impl Into<String>) -> Self {
        Self {
            inner: HashEmbedder::new(TEST_DIMENSION),
            poison: poison.into(),
        }
    }
}

#[async_trait]
impl Embedder for PoisonEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(&self.poison) {
            return Err(DeepRagError::embedding("poisoned input"));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

pub fn providers_with(embedder: Arc<dyn Embedder>, generator: Arc<dyn TextGenerator>) -> Providers {
    Providers::new(
        embedder,
        generator,
        Arc::new(InMemoryVectorStore::new()),
        4,
        Duration::from_secs(5),
    )
}

/// Hash embeddings, in-memory store and the extractive generator
pub fn offline_providers() -> Providers {
    providers_with(
        Arc::new(HashEmbedder::new(TEST_DIMENSION)),
        Arc::new(ExtractiveGenerator::default()),
    )
}

/// Strategy whose every operation fails
pub struct FailingStrategy {
    config: RagConfig,
}

impl FailingStrategy {
    pub fn new(mode: RagMode) -> Self {
        Self {
            config: RagConfig::new(mode),
        }
    }
}

#[async_trait]
impl RagStrategy for FailingStrategy {
    fn config(&self) -> &RagConfig {
        &self.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "Failing".to_string(),
            mode: self.config.mode,
            features: Vec::new(),
            complexity: Tier::Low,
            resource_usage: Tier::Low,
        }
    }

    async fn store(&self, _content: &str, _user_id: &str, _metadata: &Metadata) -> RagResult {
        RagResult::failure(self.config.mode, "store unavailable")
    }

    async fn retrieve(&self, _query: &str, _user_id: &str, _top_k: Option<usize>, _filters: &Metadata) -> RagResult {
        RagResult::failure(self.config.mode, "retrieval unavailable")
    }

    async fn generate(&self, _query: &str, _user_id: &str, _input: GenerationInput<'_>) -> RagResult {
        RagResult::failure(self.config.mode, "generation unavailable")
    }
}
