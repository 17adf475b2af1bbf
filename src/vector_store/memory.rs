//! In-process vector store with optional JSON snapshot persistence

use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;

use super::SearchFilter;
use super::SearchHit;
use super::VectorStore;
use super::TEXT_KEY;
use crate::embeddings::cosine_similarity;
use crate::embeddings::term_overlap;
use crate::errors::DeepRagError;
use crate::errors::Result;
use crate::models::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVector {
    id: String,
    vector: Vec<f32>,
    payload: Metadata,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<StoredVector>,
}

/// Brute-force store keyed by id
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: DashMap<String, StoredVector>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a snapshot written by [`save`](Self::save); a missing file yields an empty store
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::new();
        if !path.exists() {
            debug!("No snapshot at {}, starting empty", path.display());
            return Ok(store);
        }
        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        for entry in snapshot.entries {
            store.entries.insert(entry.id.clone(), entry);
        }
        info!("Loaded {} vectors from {}", store.entries.len(), path.display());
        Ok(store)
    }

    /// Write all entries, sorted by id, as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut entries: Vec<StoredVector> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&Snapshot { entries })?)?;
        info!("Saved {} vectors to {}", self.entries.len(), path.display());
        Ok(())
    }

    fn rank(&self, filter: &SearchFilter, limit: usize, score: impl Fn(&StoredVector) -> f32) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|e| filter.matches(&e.payload))
            .map(|e| {
                let entry = e.value();
                let mut metadata = entry.payload.clone();
                let text = match metadata.remove(TEXT_KEY) {
                    Some(Value::String(text)) => text,
                    _ => String::new(),
                };
                SearchHit {
                    id: entry.id.clone(),
                    text,
                    score: score(entry),
                    metadata,
                }
            })
            .collect();
        // Best first; ids break ties so results are reproducible
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Metadata) -> Result<()> {
        if id.is_empty() {
            return Err(DeepRagError::vector_store("empty id"));
        }
        if vector.is_empty() {
            return Err(DeepRagError::vector_store(format!("empty vector for {id}")));
        }
        self.entries.insert(
            id.to_string(),
            StoredVector {
                id: id.to_string(),
                vector,
                payload,
            },
        );
        Ok(())
    }

    async fn search(&self, vector: &[f32], filter: &SearchFilter, limit: usize) -> Result<Vec<SearchHit>> {
        Ok(self.rank(filter, limit, |entry| cosine_similarity(vector, &entry.vector)))
    }

    async fn keyword_search(&self, query: &str, filter: &SearchFilter, limit: usize) -> Result<Vec<SearchHit>> {
        let mut hits = self.rank(filter, usize::MAX, |entry| {
            entry
                .payload
                .get(TEXT_KEY)
                .and_then(Value::as_str)
                .map_or(0.0, |text| term_overlap(query, text))
        });
        hits.retain(|hit| hit.score > 0.0);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(user: &str, text: &str, level: u32) -> Metadata {
        json!({"user_id": user, "text": text, "level": level})
            .as_object()
            .cloned()
            .unwrap()
    }

    async fn seeded() -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store
            .upsert("a", vec![1.0, 0.0], payload("alice", "rust borrow checker", 0))
            .await
            .unwrap();
        store
            .upsert("b", vec![0.0, 1.0], payload("alice", "python garbage collector", 1))
            .await
            .unwrap();
        store
            .upsert("c", vec![1.0, 0.0], payload("bob", "rust borrow checker", 0))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_is_user_scoped_and_sorted() {
        let store = seeded().await;
        let hits = store
            .search(&[1.0, 0.0], &SearchFilter::for_user("alice"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].text, "rust borrow checker");
        assert!(!hits[0].metadata.contains_key(TEXT_KEY));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_ties_are_broken_by_id() {
        let store = seeded().await;
        let hits = store.search(&[1.0, 0.0], &SearchFilter::default(), 2).await.unwrap();
        assert_eq!(
            hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
    }

    #[tokio::test]
    async fn test_keyword_search_drops_non_matches() {
        let store = seeded().await;
        let hits = store
            .keyword_search("borrow checker", &SearchFilter::for_user("alice"), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty_vector() {
        let store = InMemoryVectorStore::new();
        assert!(store.upsert("x", vec![], Metadata::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = seeded().await;
        store.save(&path).unwrap();

        let restored = InMemoryVectorStore::load(&path).unwrap();
        assert_eq!(restored.count().await.unwrap(), 3);
        let missing = InMemoryVectorStore::load(dir.path().join("nope.json")).unwrap();
        assert_eq!(missing.count().await.unwrap(), 0);
    }
}
