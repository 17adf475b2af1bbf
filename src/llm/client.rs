//! HTTP completion client for `OpenAI`-compatible and Ollama endpoints

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::TextGenerator;
use crate::config::AppConfig;
use crate::errors::DeepRagError;
use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    /// `/chat/completions`
    OpenAI,
    /// `/api/generate` with `stream: false`
    Ollama,
}

impl LlmBackend {
    /// Ollama's default port or path marks an Ollama endpoint; anything else speaks the `OpenAI` protocol
    #[must_use]
    pub fn detect(endpoint: &str) -> Self {
        if endpoint.contains(":11434") || endpoint.contains("ollama") {
            Self::Ollama
        } else {
            Self::OpenAI
        }
    }
}

pub struct LlmClient {
    backend: LlmBackend,
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl LlmClient {
    pub fn new(backend: LlmBackend, endpoint: String, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| DeepRagError::HttpError(e.to_string()))?;

        Ok(Self {
            backend,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            model,
            client,
        })
    }

    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            LlmBackend::detect(config.llm_endpoint()),
            config.llm_endpoint().to_string(),
            config.llm_key().to_string(),
            config.llm_model().to_string(),
        )
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_openai(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
            max_tokens: usize,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            #[serde(default)]
            content: Option<String>,
        }

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("Calling chat completions API: {} ({} prompt chars)", url, prompt.len());

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![Message {
                    role: "user",
                    content: prompt,
                }],
                temperature,
                max_tokens,
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
            return Err(DeepRagError::generation(format!(
                "chat completions error ({status}): {error_text}"
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| DeepRagError::generation(format!("Failed to parse response: {e}")))?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn complete_ollama(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            num_predict: usize,
        }

        #[derive(Serialize)]
        struct GenerateRequest<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(Deserialize)]
        struct GenerateResponse {
            response: String,
        }

        let url = format!("{}/api/generate", self.endpoint);
        debug!("Calling Ollama generate API: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                options: Options {
                    temperature,
                    num_predict: max_tokens,
                },
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
            return Err(DeepRagError::generation(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| DeepRagError::generation(format!("Failed to parse response: {e}")))?;

        Ok(result.response)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate_text(&self, prompt: &str, temperature: f32, max_tokens: usize) -> Result<String> {
        let text = match self.backend {
            LlmBackend::OpenAI => self.complete_openai(prompt, temperature, max_tokens).await?,
            LlmBackend::Ollama => self.complete_ollama(prompt, temperature, max_tokens).await?,
        };
        Ok(text.trim().to_string())
    }
}
