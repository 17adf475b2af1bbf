//! Embeddings generation module
//!
//! Strategies consume embeddings through the [`Embedder`] capability:
//! - [`EmbeddingClient`]: OpenAI-compatible or Ollama HTTP endpoints
//! - [`HashEmbedder`]: deterministic, offline bag-of-words vectors
//!
//! # Examples
//!
//! ```rust,no_run
//! use deeprag::config::AppConfig;
//! use deeprag::embeddings::Embedder;
//! use deeprag::embeddings::EmbeddingClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let client = EmbeddingClient::from_app_config(&config)?;
//!
//!     let embedding = client.embed("Hello, world!").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod local;
pub mod text_preprocessing;

use async_trait::async_trait;
pub use client::EmbeddingBackend;
pub use client::EmbeddingClient;
pub use local::HashEmbedder;
pub use text_preprocessing::extract_terms;
pub use text_preprocessing::preprocess_text_for_embedding;
pub use text_preprocessing::term_overlap;

use crate::errors::Result;

/// Text-to-vector capability
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text into a fixed-dimension vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts, preserving input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize;
}

/// Cosine similarity; zero when either vector has no magnitude or dimensions differ
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
