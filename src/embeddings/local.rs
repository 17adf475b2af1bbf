//! Deterministic offline embeddings
//!
//! Hashes content terms and adjacent-term bigrams into a fixed number of buckets and
//! L2-normalizes the result. Texts sharing vocabulary land close together, which is
//! enough for offline runs and tests; it is not a semantic model.

use async_trait::async_trait;
use sha2::Digest;
use sha2::Sha256;

use super::extract_terms;
use super::Embedder;
use crate::errors::DeepRagError;
use crate::errors::Result;

pub const DEFAULT_HASH_DIMENSION: usize = 384;

const BIGRAM_WEIGHT: f32 = 0.8;

#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn bucket(&self, token: &str) -> (usize, usize) {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);
        let primary = (hash % self.dimension as u64) as usize;
        let secondary = ((hash >> 32) % self.dimension as u64) as usize;
        (primary, secondary)
    }

    /// Synchronous embedding, used directly by tests and the offline CLI
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let terms = extract_terms(text);
        if terms.is_empty() && text.trim().is_empty() {
            return Err(DeepRagError::embedding("Empty text provided"));
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for term in &terms {
            let (primary, secondary) = self.bucket(term);
            embedding[primary] += 1.0;
            embedding[secondary] += 0.5;
        }
        for pair in terms.windows(2) {
            let (primary, _) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            embedding[primary] += BIGRAM_WEIGHT;
        }

        // Stopword-only text still gets a stable, non-zero vector
        if terms.is_empty() {
            let (primary, _) = self.bucket(&text.trim().to_lowercase());
            embedding[primary] = 1.0;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }
        Ok(embedding)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_sync("Rust ownership and borrowing").unwrap();
        let b = embedder.embed_sync("Rust ownership and borrowing").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed_sync("photosynthesis in green plants").unwrap();
        let related = embedder
            .embed_sync("Green plants perform photosynthesis using sunlight")
            .unwrap();
        let unrelated = embedder
            .embed_sync("The stock market closed higher on Friday")
            .unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected() {
        let embedder = HashEmbedder::default();
        assert!(embedder.embed("   ").await.is_err());
        assert!(embedder.embed("the and").await.is_ok());
    }
}
