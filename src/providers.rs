//! Injected provider clients behind a shared concurrency limiter
//!
//! Every embedding, generation and vector-store call made by a strategy goes through
//! [`Providers`]: it waits for a permit from one shared [`Semaphore`] (saturation
//! queues, it never fails), runs under a per-call timeout, and reports any failure as
//! [`DeepRagError::ProviderUnavailable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

use crate::config::AppConfig;
use crate::embeddings::Embedder;
use crate::errors::DeepRagError;
use crate::errors::ProviderKind;
use crate::errors::Result;
use crate::llm::TextGenerator;
use crate::models::Metadata;
use crate::vector_store::SearchFilter;
use crate::vector_store::SearchHit;
use crate::vector_store::VectorStore;

#[derive(Clone)]
pub struct Providers {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn VectorStore>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
}

impl Providers {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn VectorStore>,
        max_concurrent_calls: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            limiter: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
            timeout,
        }
    }

    /// Limits taken from `[limits]`
    pub fn from_app_config(
        config: &AppConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(
            embedder,
            generator,
            store,
            config.limits.max_concurrent_calls,
            config.provider_timeout(),
        )
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    #[must_use]
    pub fn embedding_dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Permits currently free; equals the configured limit when idle
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.limiter.available_permits()
    }

    async fn guarded<T, F>(&self, provider: ProviderKind, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| unavailable(provider, "concurrency limiter closed"))?;

        match timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{} failed during {}: {}", provider, operation, e);
                Err(match e {
                    DeepRagError::ProviderUnavailable { .. } => e,
                    other => unavailable(provider, other.to_string()),
                })
            }
            Err(_) => {
                warn!(
                    "{} timed out during {} after {}s",
                    provider,
                    operation,
                    self.timeout.as_secs_f64()
                );
                Err(unavailable(
                    provider,
                    format!("{operation} timed out after {:?}", self.timeout),
                ))
            }
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.guarded(ProviderKind::Embedding, "embed", self.embedder.embed(text))
            .await
    }

    /// One result per input, in input order; each call is gated separately
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        join_all(texts.iter().map(|text| self.embed(text))).await
    }

    /// Completion text; an empty completion counts as a failure
    pub async fn generate(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        let text = self
            .guarded(
                ProviderKind::Generation,
                "generate_text",
                self.generator.generate_text(prompt, temperature, max_tokens),
            )
            .await?;
        if text.trim().is_empty() {
            warn!("generation provider returned empty text");
            return Err(unavailable(ProviderKind::Generation, "empty completion"));
        }
        Ok(text)
    }

    pub async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Metadata) -> Result<()> {
        self.guarded(
            ProviderKind::VectorStore,
            "upsert",
            self.store.upsert(id, vector, payload),
        )
        .await
    }

    pub async fn search(&self, vector: &[f32], filter: &SearchFilter, limit: usize) -> Result<Vec<SearchHit>> {
        self.guarded(
            ProviderKind::VectorStore,
            "search",
            self.store.search(vector, filter, limit),
        )
        .await
    }

    pub async fn keyword_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.guarded(
            ProviderKind::VectorStore,
            "keyword_search",
            self.store.keyword_search(query, filter, limit),
        )
        .await
    }
}

fn unavailable(provider: ProviderKind, message: impl Into<String>) -> DeepRagError {
    DeepRagError::ProviderUnavailable {
        provider,
        message: message.into(),
    }
}
