//! Embedding API clients for various providers

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::preprocess_text_for_embedding;
use super::Embedder;
use crate::config::AppConfig;
use crate::errors::DeepRagError;
use crate::errors::Result;

/// Supported remote embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// `OpenAI`-compatible `/embeddings` API
    OpenAI,
    /// Ollama local embeddings
    Ollama,
}

impl EmbeddingBackend {
    /// Resolve the backend from a config value, falling back on the endpoint domain
    #[must_use]
    pub fn detect(name: &str, endpoint: &str) -> Self {
        match name.to_lowercase().as_str() {
            "openai" => Self::OpenAI,
            "ollama" => Self::Ollama,
            _ if endpoint.contains("api.openai.com") => Self::OpenAI,
            _ => Self::Ollama,
        }
    }
}

/// Client for generating embeddings from a remote provider
pub struct EmbeddingClient {
    backend: EmbeddingBackend,
    model: String,
    endpoint: String,
    api_key: Option<String>,
    dimension: usize,
    client: Client,
}

impl EmbeddingClient {
    /// Create a new embedding client
    pub fn new(
        backend: EmbeddingBackend,
        model: String,
        endpoint: String,
        api_key: Option<String>,
        dimension: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| DeepRagError::HttpError(e.to_string()))?;

        Ok(Self {
            backend,
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            dimension,
            client,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let embeddings = &config.embeddings;
        Self::new(
            EmbeddingBackend::detect(&embeddings.backend, &embeddings.endpoint),
            embeddings.model.clone(),
            embeddings.endpoint.clone(),
            embeddings.api_key.clone(),
            embeddings.dimension,
        )
    }

    #[must_use]
    pub const fn backend(&self) -> EmbeddingBackend {
        self.backend
    }

    /// Generate embedding using `OpenAI` API
    async fn embed_openai(&self, input: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| DeepRagError::ConfigError("OpenAI API key not provided".to_string()))?;

        #[derive(Serialize)]
        struct OpenAIRequest<'a> {
            input: Vec<&'a str>,
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.endpoint);
        debug!("Calling OpenAI embeddings API: {} items", input.len());

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&OpenAIRequest {
                input,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| DeepRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeepRagError::embedding(format!(
                "OpenAI API error ({status}): {error_text}"
            )));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| DeepRagError::embedding(format!("Failed to parse response: {e}")))?;

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Generate embedding using Ollama API
    async fn embed_ollama(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.endpoint);
        debug!("Calling Ollama embeddings API: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| DeepRagError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeepRagError::embedding(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| DeepRagError::embedding(format!("Failed to parse response: {e}")))?;

        Ok(result.embedding)
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() == self.dimension {
            Ok(())
        } else {
            Err(DeepRagError::embedding(format!(
                "expected {} dimensions, provider returned {}",
                self.dimension,
                embedding.len()
            )))
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let processed = preprocess_text_for_embedding(text)?;
        let embedding = match self.backend {
            EmbeddingBackend::OpenAI => self
                .embed_openai(vec![processed.as_str()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| DeepRagError::embedding("No embedding in response"))?,
            EmbeddingBackend::Ollama => self.embed_ollama(&processed).await?,
        };
        self.check_dimension(&embedding)?;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.backend {
            EmbeddingBackend::OpenAI => {
                let processed = texts
                    .iter()
                    .map(|t| preprocess_text_for_embedding(t))
                    .collect::<Result<Vec<_>>>()?;
                let embeddings = self
                    .embed_openai(processed.iter().map(String::as_str).collect())
                    .await?;
                if embeddings.len() != texts.len() {
                    return Err(DeepRagError::embedding(format!(
                        "requested {} embeddings, received {}",
                        texts.len(),
                        embeddings.len()
                    )));
                }
                for embedding in &embeddings {
                    self.check_dimension(embedding)?;
                }
                Ok(embeddings)
            }
            EmbeddingBackend::Ollama => {
                // Ollama doesn't support batch; fan out and keep order
                let results = futures::future::join_all(texts.iter().map(|t| self.embed(t))).await;
                results.into_iter().collect()
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
