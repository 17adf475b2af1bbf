//! Strategy contract and the helpers every strategy shares
//!
//! Contract operations never return `Err`: provider failures are caught at the stage
//! boundary and reported through [`RagResult::success`] / [`RagResult::error`] or as
//! warnings in the result metadata.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::chunking::chunk_text;
use super::chunking::document_id;
use super::context::ContextAssembler;
use crate::config::AppConfig;
use crate::errors::DeepRagError;
use crate::errors::Result;
use crate::llm::RagPrompts;
use crate::models::Capabilities;
use crate::models::Chunk;
use crate::models::Metadata;
use crate::models::RagConfig;
use crate::models::RagMode;
use crate::models::RagResult;
use crate::models::RagSource;
use crate::providers::Providers;
use crate::vector_store::Condition;
use crate::vector_store::SearchFilter;
use crate::vector_store::SearchHit;
use crate::vector_store::CHUNK_KEY;
use crate::vector_store::DOCUMENT_KEY;
use crate::vector_store::LEVEL_KEY;
use crate::vector_store::TEXT_KEY;
use crate::vector_store::TREE_KEY;
use crate::vector_store::USER_KEY;

pub const INSUFFICIENT_INFORMATION: &str =
    "I could not find enough information in the knowledge base to answer this question.";

/// What `generate` grounds its answer on
#[derive(Debug, Clone, Copy)]
pub enum GenerationInput<'a> {
    /// Pre-assembled context text
    Context(&'a str),
    /// Output of a previous `retrieve`
    Retrieval(&'a RagResult),
}

/// Uniform interface implemented by every retrieval/generation strategy
#[async_trait]
pub trait RagStrategy: Send + Sync {
    fn config(&self) -> &RagConfig;

    fn mode(&self) -> RagMode {
        self.config().mode
    }

    fn capabilities(&self) -> Capabilities;

    /// Index `content` for `user_id`
    async fn store(&self, content: &str, user_id: &str, metadata: &Metadata) -> RagResult;

    /// Populate sources, leave content empty; `top_k` defaults to the configured value
    async fn retrieve(
        &self,
        query: &str,
        user_id: &str,
        top_k: Option<usize>,
        filters: &Metadata,
    ) -> RagResult;

    /// Populate content from the given context or retrieval result
    async fn generate(&self, query: &str, user_id: &str, input: GenerationInput<'_>) -> RagResult;

    /// `retrieve` then `generate`
    async fn query(&self, query: &str, user_id: &str) -> RagResult {
        let started = Instant::now();
        let retrieval = self.retrieve(query, user_id, None, &Metadata::new()).await;
        if !retrieval.success {
            return retrieval.timed(started);
        }

        let mut result = self
            .generate(query, user_id, GenerationInput::Retrieval(&retrieval))
            .await;
        result
            .metadata
            .insert("retrieval".to_string(), Value::Object(retrieval.metadata));
        result.timed(started)
    }
}

/// Completion parameters for answer generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Summary of a chunk-and-upsert pass
#[derive(Debug, Default)]
pub struct StoreOutcome {
    pub document_id: String,
    pub chunks: usize,
    pub stored: Vec<String>,
    pub failures: Vec<String>,
}

/// Keep the first (best) hit per `(document_id, chunk_id)`, at most `limit`
///
/// The same chunk is persisted once per storing mode (flat chunk and RAPTOR leaf);
/// hits without chunk identity are keyed by their id.
#[must_use]
pub fn dedupe_chunks(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| {
            let key = match (
                hit.metadata.get(DOCUMENT_KEY).and_then(Value::as_str),
                hit.metadata.get(CHUNK_KEY).and_then(Value::as_str),
            ) {
                (Some(document), Some(chunk)) => format!("{document}:{chunk}"),
                _ => hit.id.clone(),
            };
            seen.insert(key)
        })
        .take(limit)
        .collect()
}

/// Configuration plus injected providers, with the operations strategies have in common
#[derive(Clone)]
pub struct StrategyCore {
    pub config: RagConfig,
    pub providers: Providers,
    pub generation: GenerationSettings,
}

impl StrategyCore {
    /// Bundle configuration, providers and completion settings for one strategy
    #[must_use]
    pub fn new(config: RagConfig, providers: Providers, generation: GenerationSettings) -> Self {
        Self {
            config,
            providers,
            generation,
        }
    }

    /// Reject blank text or a blank user id
    pub fn validate_request(text: &str, user_id: &str, what: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(DeepRagError::Validation(format!("{what} must not be empty")));
        }
        if user_id.trim().is_empty() {
            return Err(DeepRagError::Validation("user_id must not be empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn chunk(&self, content: &str) -> Vec<Chunk> {
        chunk_text(content, self.config.chunk_size, self.config.overlap)
    }

    /// Requested `top_k` or the configured one, never zero
    #[must_use]
    pub fn top_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.top_k).max(1)
    }

    #[must_use]
    pub fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new(self.config.max_context_length)
    }

    /// User scope plus the caller's equality filters, across every tree level
    #[must_use]
    pub fn scope(user_id: &str, filters: &Metadata) -> SearchFilter {
        SearchFilter::for_user(user_id).with_equals(filters)
    }

    /// [`Self::scope`] restricted to level-0 chunks; summary nodes are excluded
    #[must_use]
    pub fn filter(user_id: &str, filters: &Metadata) -> SearchFilter {
        Self::scope(user_id, filters).with(LEVEL_KEY, Condition::Equals(json!(0)))
    }

    /// Caller metadata overlaid with the fields the store and retrieval rely on
    #[must_use]
    pub fn payload(&self, user_id: &str, text: &str, metadata: &Metadata) -> Metadata {
        let mut payload = metadata.clone();
        payload.insert(USER_KEY.to_string(), json!(user_id));
        payload.insert(TEXT_KEY.to_string(), json!(text));
        payload.insert("mode".to_string(), json!(self.config.mode.as_str()));
        payload
    }

    /// Chunk, embed and upsert `content`; items whose embedding or upsert fails are skipped
    pub async fn store_chunks(&self, content: &str, user_id: &str, metadata: &Metadata) -> StoreOutcome {
        let document_id = document_id(user_id, content);
        let chunks = self.chunk(content);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.providers.embed_batch(&texts).await;

        let mut outcome = StoreOutcome {
            document_id: document_id.clone(),
            chunks: chunks.len(),
            ..StoreOutcome::default()
        };

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let id = format!("{document_id}:{}", chunk.id);
            let vector = match embedding {
                Ok(vector) => vector,
                Err(e) => {
                    outcome.failures.push(format!("{id}: {e}"));
                    continue;
                }
            };
            let mut payload = self.payload(user_id, &chunk.text, metadata);
            payload.insert(DOCUMENT_KEY.to_string(), json!(document_id));
            payload.insert(CHUNK_KEY.to_string(), json!(chunk.id));
            payload.insert(TREE_KEY.to_string(), json!(document_id));
            payload.insert(LEVEL_KEY.to_string(), json!(0));
            payload.insert("start_offset".to_string(), json!(chunk.start_offset));
            payload.insert("end_offset".to_string(), json!(chunk.end_offset));

            match self.providers.upsert(&id, vector, payload).await {
                Ok(()) => outcome.stored.push(id),
                Err(e) => outcome.failures.push(format!("{id}: {e}")),
            }
        }

        info!(
            "Stored {}/{} chunks of document {} for user {}",
            outcome.stored.len(),
            outcome.chunks,
            document_id,
            user_id
        );
        outcome
    }

    /// Convert a store pass into the contract result
    #[must_use]
    pub fn store_result(&self, outcome: StoreOutcome, started: Instant) -> RagResult {
        let mode = self.config.mode;
        let mut result = if outcome.stored.is_empty() {
            let reason = outcome
                .failures
                .first()
                .cloned()
                .unwrap_or_else(|| "content produced no chunks".to_string());
            RagResult::failure(mode, format!("nothing was stored: {reason}"))
        } else {
            RagResult::success(mode).with_content(format!(
                "Stored {} chunk(s) for document {}",
                outcome.stored.len(),
                outcome.document_id
            ))
        };
        for failure in &outcome.failures {
            warn!("Store degraded: {}", failure);
            result.record_warning(failure.clone());
        }
        result
            .with_metadata("document_id", outcome.document_id)
            .with_metadata("chunks", outcome.chunks)
            .with_metadata("stored", outcome.stored.len())
            .timed(started)
    }

    /// Embed the query and run a filtered similarity search, one hit per chunk
    pub async fn vector_search(&self, query: &str, filter: &SearchFilter, limit: usize) -> Result<Vec<SearchHit>> {
        let embedding = self.providers.embed(query).await?;
        let hits = self.providers.search(&embedding, filter, limit * 2).await?;
        let hits = dedupe_chunks(hits, limit);
        debug!("Vector search returned {} hits (limit {})", hits.len(), limit);
        Ok(hits)
    }

    /// Lexical search, one hit per chunk
    pub async fn keyword_search(&self, query: &str, filter: &SearchFilter, limit: usize) -> Result<Vec<SearchHit>> {
        let hits = self.providers.keyword_search(query, filter, limit * 2).await?;
        Ok(dedupe_chunks(hits, limit))
    }

    /// Grounded answer with citations; no sources yields the insufficient-information answer
    pub async fn answer(&self, query: &str, input: GenerationInput<'_>) -> RagResult {
        let started = Instant::now();
        let mode = self.config.mode;

        let (context, sources): (String, Vec<RagSource>) = match input {
            GenerationInput::Context(context) => (context.to_string(), Vec::new()),
            GenerationInput::Retrieval(retrieval) => {
                let (context, citations) = self.assembler().assemble_with_citations(&retrieval.sources);
                debug!("Assembled context with {} citation(s)", citations.len());
                (context, retrieval.sources.clone())
            }
        };

        if context.trim().is_empty() {
            return RagResult::success(mode)
                .with_content(INSUFFICIENT_INFORMATION)
                .with_metadata("insufficient_context", true)
                .timed(started);
        }

        let prompt = match RagPrompts::answer_with_citations()
            .render(&[("context", context.as_str()), ("question", query)])
        {
            Ok(prompt) => prompt,
            Err(e) => return RagResult::failure(mode, e.to_string()).timed(started),
        };

        match self
            .providers
            .generate(&prompt, self.generation.temperature, self.generation.max_tokens)
            .await
        {
            Ok(answer) => RagResult::success(mode)
                .with_content(answer)
                .with_sources(sources)
                .with_metadata("context_length", context.len())
                .timed(started),
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                RagResult::failure(mode, e.to_string())
                    .with_sources(sources)
                    .timed(started)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::tests::offline_providers;
    use crate::tests::providers_with;
    use crate::tests::FailingGenerator;
    use crate::tests::PoisonEmbedder;
    use crate::tests::ScriptedGenerator;

    fn core(providers: Providers) -> StrategyCore {
        let config = RagConfig {
            chunk_size: 120,
            overlap: 20,
            ..RagConfig::new(RagMode::Basic)
        };
        StrategyCore::new(config, providers, GenerationSettings::default())
    }

    #[test]
    fn test_validate_request() {
        assert!(StrategyCore::validate_request("q", "u", "query").is_ok());
        assert!(matches!(
            StrategyCore::validate_request("  ", "u", "query"),
            Err(DeepRagError::Validation(_))
        ));
        assert!(StrategyCore::validate_request("q", "", "query").is_err());
    }

    #[tokio::test]
    async fn test_store_chunks_skips_failed_embeddings() {
        let core = core(providers_with(
            Arc::new(PoisonEmbedder::new("POISON")),
            Arc::new(ScriptedGenerator::new("ok")),
        ));
        let content = "Healthy sentence number one about rivers. More words follow here to pad.\n\n\
                       POISON sentence that cannot be embedded at all, sadly for everyone.\n\n\
                       Final healthy sentence about mountains and valleys to close it out.";
        let outcome = core.store_chunks(content, "alice", &Metadata::new()).await;
        assert!(outcome.chunks >= 2);
        assert!(!outcome.failures.is_empty());
        assert_eq!(outcome.stored.len() + outcome.failures.len(), outcome.chunks);

        let result = core.store_result(outcome, Instant::now());
        assert!(result.success);
        assert!(result.metadata.contains_key("warnings"));
    }

    #[tokio::test]
    async fn test_answer_without_context_is_explicit() {
        let generator = Arc::new(ScriptedGenerator::new("should not be called"));
        let core = core(providers_with(Arc::new(HashEmbedder::default()), generator.clone()));
        let empty = RagResult::success(RagMode::Basic);
        let result = core.answer("anything?", GenerationInput::Retrieval(&empty)).await;
        assert!(result.success);
        assert_eq!(result.content, INSUFFICIENT_INFORMATION);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_failure_is_reported_not_raised() {
        let core = core(providers_with(
            Arc::new(HashEmbedder::default()),
            Arc::new(FailingGenerator),
        ));
        let result = core
            .answer("q", GenerationInput::Context("Some context."))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("generation provider"));
    }

    #[tokio::test]
    async fn test_payload_keeps_caller_metadata() {
        let core = core(offline_providers());
        let mut metadata = Metadata::new();
        metadata.insert("page".to_string(), json!(4));
        let payload = core.payload("alice", "text", &metadata);
        assert_eq!(payload["page"], json!(4));
        assert_eq!(payload[USER_KEY], json!("alice"));
        assert_eq!(payload["mode"], json!("basic"));
    }

    #[tokio::test]
    async fn test_stored_chunks_are_tree_leaves() {
        let core = core(offline_providers());
        let outcome = core
            .store_chunks("Short note about tides and the moon.", "alice", &Metadata::new())
            .await;
        assert_eq!(outcome.stored.len(), 1);

        let hits = core
            .vector_search("tides", &StrategyCore::filter("alice", &Metadata::new()), 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata[LEVEL_KEY], json!(0));
        assert_eq!(hits[0].metadata[TREE_KEY], json!(outcome.document_id));
    }

    #[test]
    fn test_dedupe_chunks_keeps_best_per_chunk() {
        let hit = |id: &str, chunk: Option<&str>| {
            let mut metadata = Metadata::new();
            if let Some(chunk) = chunk {
                metadata.insert(DOCUMENT_KEY.to_string(), json!("doc"));
                metadata.insert(CHUNK_KEY.to_string(), json!(chunk));
            }
            SearchHit {
                id: id.to_string(),
                text: String::new(),
                score: 0.0,
                metadata,
            }
        };
        let hits = vec![
            hit("doc:L0:chunk-0001", Some("chunk-0001")),
            hit("doc:chunk-0001", Some("chunk-0001")),
            hit("doc:L1:0", None),
            hit("doc:chunk-0002", Some("chunk-0002")),
        ];
        let ids: Vec<String> = dedupe_chunks(hits.clone(), 10).into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["doc:L0:chunk-0001", "doc:L1:0", "doc:chunk-0002"]);
        assert_eq!(dedupe_chunks(hits, 1).len(), 1);
    }
}
