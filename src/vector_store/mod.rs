//! Vector store capability
//!
//! Payloads are opaque metadata maps. Two keys are interpreted by the store: `text`
//! (returned as [`SearchHit::text`]) and `user_id` (the scope every [`SearchFilter`]
//! applies).

pub mod memory;

use async_trait::async_trait;
pub use memory::InMemoryVectorStore;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::errors::Result;
use crate::models::Metadata;
use crate::models::RagSource;

pub const TEXT_KEY: &str = "text";
pub const USER_KEY: &str = "user_id";
pub const DOCUMENT_KEY: &str = "document_id";
pub const CHUNK_KEY: &str = "chunk_id";
pub const TREE_KEY: &str = "tree_id";
pub const LEVEL_KEY: &str = "level";

/// Predicate on one payload field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Equals(Value),
    /// Numeric field greater than or equal to the bound
    AtLeast(f64),
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Self::Equals(expected), Some(actual)) => expected == actual,
            (Self::AtLeast(bound), Some(actual)) => actual.as_f64().is_some_and(|v| v >= *bound),
            (_, None) => false,
        }
    }
}

/// User scope plus arbitrary field conditions, all of which must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub user_id: Option<String>,
    pub conditions: Vec<(String, Condition)>,
}

impl SearchFilter {
    #[must_use]
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, condition: Condition) -> Self {
        self.conditions.push((key.into(), condition));
        self
    }

    /// Adds an equality condition per entry of `metadata`
    #[must_use]
    pub fn with_equals(mut self, metadata: &Metadata) -> Self {
        for (key, value) in metadata {
            self.conditions
                .push((key.clone(), Condition::Equals(value.clone())));
        }
        self
    }

    #[must_use]
    pub fn matches(&self, payload: &Metadata) -> bool {
        if let Some(user_id) = &self.user_id {
            if payload.get(USER_KEY).and_then(Value::as_str) != Some(user_id.as_str()) {
                return false;
            }
        }
        self.conditions
            .iter()
            .all(|(key, condition)| condition.matches(payload.get(key)))
    }
}

/// One search result; `metadata` is the stored payload without its text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Metadata,
}

impl SearchHit {
    #[must_use]
    pub fn into_source(self) -> RagSource {
        let mut metadata = self.metadata;
        metadata.insert("id".to_string(), Value::String(self.id));
        RagSource {
            text: self.text,
            score: self.score,
            metadata,
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector stored under `id`
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Metadata) -> Result<()>;

    /// Nearest neighbours by cosine similarity, best first
    async fn search(&self, vector: &[f32], filter: &SearchFilter, limit: usize)
        -> Result<Vec<SearchHit>>;

    /// Lexical matches scored by query term overlap, best first
    async fn keyword_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    async fn count(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Metadata {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_filter_scopes_by_user_and_conditions() {
        let stored = payload(json!({"user_id": "alice", "level": 1, "tree_id": "t1"}));

        assert!(SearchFilter::default().matches(&stored));
        assert!(SearchFilter::for_user("alice").matches(&stored));
        assert!(!SearchFilter::for_user("bob").matches(&stored));
        assert!(SearchFilter::for_user("alice")
            .with("level", Condition::AtLeast(1.0))
            .matches(&stored));
        assert!(!SearchFilter::for_user("alice")
            .with("level", Condition::Equals(json!(0)))
            .matches(&stored));
        assert!(!SearchFilter::default()
            .with("missing", Condition::AtLeast(0.0))
            .matches(&stored));
    }

    #[test]
    fn test_with_equals_from_metadata() {
        let stored = payload(json!({"user_id": "alice", "page": 3}));
        let wanted = payload(json!({"page": 3}));
        assert!(SearchFilter::for_user("alice").with_equals(&wanted).matches(&stored));
        let other = payload(json!({"page": 4}));
        assert!(!SearchFilter::for_user("alice").with_equals(&other).matches(&stored));
    }

    #[test]
    fn test_hit_into_source_carries_id() {
        let hit = SearchHit {
            id: "doc:chunk-0000".to_string(),
            text: "hello".to_string(),
            score: 0.5,
            metadata: Metadata::new(),
        };
        let source = hit.into_source();
        assert_eq!(source.id(), Some("doc:chunk-0000"));
        assert_eq!(source.text, "hello");
    }
}
