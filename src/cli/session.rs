//! Providers, store and registry for one CLI invocation

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::embeddings::Embedder;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::HashEmbedder;
use crate::llm::ExtractiveGenerator;
use crate::llm::LlmClient;
use crate::llm::TextGenerator;
use crate::providers::Providers;
use crate::rag::StrategyRegistry;
use crate::vector_store::InMemoryVectorStore;
use crate::Result;

/// Embeddings backend name that selects the offline hash embedder
pub const HASH_BACKEND: &str = "hash";

/// Explicit path, then `config.toml` / `config.example.toml`, then built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::from_file(path);
    }
    match AppConfig::load() {
        Ok(config) => Ok(config),
        Err(crate::DeepRagError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("No configuration file found, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e),
    }
}

pub struct Session {
    pub config: AppConfig,
    store: Arc<InMemoryVectorStore>,
    snapshot: Option<PathBuf>,
    registry: StrategyRegistry,
}

impl Session {
    /// Build providers; with `offline` or the `hash` backend no network provider is used
    pub fn open(config: AppConfig, offline: bool, snapshot: Option<PathBuf>) -> Result<Self> {
        let store = Arc::new(match &snapshot {
            Some(path) => InMemoryVectorStore::load(path)?,
            None => InMemoryVectorStore::new(),
        });

        let hash_backend = config.embeddings.backend.eq_ignore_ascii_case(HASH_BACKEND);
        let embedder: Arc<dyn Embedder> = if offline || hash_backend {
            Arc::new(HashEmbedder::new(config.embedding_dimension()))
        } else {
            Arc::new(EmbeddingClient::from_app_config(&config)?)
        };
        let generator: Arc<dyn TextGenerator> = if offline {
            Arc::new(ExtractiveGenerator::default())
        } else {
            Arc::new(LlmClient::from_app_config(&config)?)
        };
        info!(
            "Session ready (offline: {}, hash embeddings: {})",
            offline,
            offline || hash_backend
        );

        let providers = Providers::from_app_config(&config, embedder, generator, store.clone());
        let registry = StrategyRegistry::new(config.clone(), providers);
        Ok(Self {
            config,
            store,
            snapshot,
            registry,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stored_vectors(&self) -> usize {
        self.store.len()
    }

    /// Write the store back to its snapshot, if it has one
    pub fn persist(&self) -> Result<()> {
        if let Some(path) = &self.snapshot {
            self.store.save(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::models::RagMode;
    use crate::rag::DEFAULT_INSTANCE;

    #[tokio::test]
    async fn test_offline_session_persists_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("store.json");

        let session = Session::open(AppConfig::default(), true, Some(snapshot.clone())).unwrap();
        let stored = session
            .registry()
            .get_or_create(RagMode::Basic, DEFAULT_INSTANCE)
            .store("Otters hold hands while sleeping so they do not drift apart.", "alice", &Metadata::new())
            .await;
        assert!(stored.success);
        session.persist().unwrap();

        let reopened = Session::open(AppConfig::default(), true, Some(snapshot)).unwrap();
        assert_eq!(reopened.stored_vectors(), session.stored_vectors());
        let result = reopened
            .registry()
            .get_or_create(RagMode::Basic, DEFAULT_INSTANCE)
            .query("Why do otters hold hands?", "alice")
            .await;
        assert!(result.success);
        assert!(result.content.contains("Otters"));
    }

    #[test]
    fn test_hash_backend_needs_no_network() {
        let mut config = AppConfig::default();
        config.embeddings.backend = HASH_BACKEND.to_string();
        let session = Session::open(config, false, None).unwrap();
        assert_eq!(session.registry().providers().embedding_dimension(), 768);
    }
}
