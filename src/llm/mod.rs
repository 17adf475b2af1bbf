//! Text generation providers
//!
//! Strategies depend only on [`TextGenerator`]; concrete backends are
//! [`LlmClient`] (`OpenAI`-compatible chat completions or Ollama) and the offline
//! [`ExtractiveGenerator`].

pub mod client;
pub mod extractive;
pub mod prompts;

use async_trait::async_trait;
pub use client::LlmBackend;
pub use client::LlmClient;
pub use extractive::ExtractiveGenerator;
pub use prompts::PromptTemplate;
pub use prompts::RagPrompts;

use crate::errors::Result;

/// Single-turn completion capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str, temperature: f32, max_tokens: usize)
        -> Result<String>;
}
