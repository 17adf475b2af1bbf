use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::errors::DeepRagError;
use crate::models::RagConfig;
use crate::models::RagMode;
use crate::Result;

/// Prefix for environment overrides, e.g. `DEEPRAG__RAG__TOP_K=8`
pub const ENV_PREFIX: &str = "DEEPRAG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// `ollama`, `openai` or `hash` (offline)
    #[serde(default = "default_embedding_backend")]
    pub backend: String,
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            dimension: default_dimension(),
            api_key: None,
        }
    }
}

fn default_embedding_backend() -> String {
    "ollama".to_string()
}

fn default_embedding_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

const fn default_dimension() -> usize {
    768
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub llm_endpoint: String,
    pub llm_key: String,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_llm_model() -> String {
    "gemma3:27b".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> usize {
    2000
}

/// Defaults shared by every strategy's `RagConfig`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagDefaults {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub similarity_threshold: f32,
    #[serde(default)]
    pub enable_rerank: bool,
    #[serde(default = "default_max_context_length")]
    pub max_context_length: usize,
}

const fn default_chunk_size() -> usize {
    1000
}

const fn default_overlap() -> usize {
    200
}

const fn default_top_k() -> usize {
    5
}

const fn default_max_context_length() -> usize {
    8000
}

impl Default for RagDefaults {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            top_k: default_top_k(),
            similarity_threshold: 0.0,
            enable_rerank: false,
            max_context_length: default_max_context_length(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaptorConfig {
    /// Cosine similarity a node must exceed to join a cluster
    #[serde(default = "default_cluster_threshold")]
    pub cluster_threshold: f32,
    #[serde(default = "default_max_levels")]
    pub max_levels: u32,
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: usize,
    #[serde(default = "default_summary_temperature")]
    pub summary_temperature: f32,
}

const fn default_cluster_threshold() -> f32 {
    0.75
}

const fn default_max_levels() -> u32 {
    3
}

const fn default_summary_max_tokens() -> usize {
    300
}

const fn default_summary_temperature() -> f32 {
    0.3
}

impl Default for RaptorConfig {
    fn default() -> Self {
        Self {
            cluster_threshold: default_cluster_threshold(),
            max_levels: default_max_levels(),
            summary_max_tokens: default_summary_max_tokens(),
            summary_temperature: default_summary_temperature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CragConfig {
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_true")]
    pub enable_refinement: bool,
}

const fn default_quality_threshold() -> f32 {
    0.5
}

const fn default_true() -> bool {
    true
}

impl Default for CragConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            enable_refinement: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepThinkingConfig {
    #[serde(default = "default_max_reasoning_iterations")]
    pub max_reasoning_iterations: usize,
    /// Complexity above which a three-step plan is produced
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f32,
    /// Broad-recall width of the retrieval funnel
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
    /// Candidates kept after reranking
    #[serde(default = "default_rerank_k")]
    pub rerank_k: usize,
    #[serde(default = "default_true")]
    pub enable_distillation: bool,
    #[serde(default = "default_finish_confidence")]
    pub finish_confidence: f32,
    #[serde(default)]
    pub use_llm_policy: bool,
}

const fn default_max_reasoning_iterations() -> usize {
    5
}

const fn default_complexity_threshold() -> f32 {
    0.7
}

const fn default_recall_k() -> usize {
    20
}

const fn default_rerank_k() -> usize {
    5
}

const fn default_finish_confidence() -> f32 {
    0.85
}

impl Default for DeepThinkingConfig {
    fn default() -> Self {
        Self {
            max_reasoning_iterations: default_max_reasoning_iterations(),
            complexity_threshold: default_complexity_threshold(),
            recall_k: default_recall_k(),
            rerank_k: default_rerank_k(),
            enable_distillation: true,
            finish_confidence: default_finish_confidence(),
            use_llm_policy: false,
        }
    }
}

/// Upstream rate-limit protection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
}

const fn default_max_concurrent_calls() -> usize {
    8
}

const fn default_provider_timeout_secs() -> u64 {
    60
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
            provider_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub rag: RagDefaults,
    #[serde(default)]
    pub raptor: RaptorConfig,
    #[serde(default)]
    pub crag: CragConfig,
    #[serde(default)]
    pub deep_thinking: DeepThinkingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file, applying `DEEPRAG__*` environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DeepRagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", path.display()),
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            tracing::warn!(
                "Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(DeepRagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Reject malformed configuration before any provider is constructed
    pub fn validate(&self) -> Result<()> {
        self.rag_config(RagMode::Basic).validate()?;

        for (name, value) in [
            ("raptor.cluster_threshold", self.raptor.cluster_threshold),
            ("crag.quality_threshold", self.crag.quality_threshold),
            (
                "deep_thinking.complexity_threshold",
                self.deep_thinking.complexity_threshold,
            ),
            (
                "deep_thinking.finish_confidence",
                self.deep_thinking.finish_confidence,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DeepRagError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.deep_thinking.max_reasoning_iterations == 0 {
            return Err(DeepRagError::Validation(
                "deep_thinking.max_reasoning_iterations must be >= 1".to_string(),
            ));
        }
        if self.deep_thinking.recall_k < self.deep_thinking.rerank_k
            || self.deep_thinking.rerank_k == 0
        {
            return Err(DeepRagError::Validation(
                "deep_thinking requires 1 <= rerank_k <= recall_k".to_string(),
            ));
        }
        if self.raptor.max_levels == 0 {
            return Err(DeepRagError::Validation(
                "raptor.max_levels must be >= 1".to_string(),
            ));
        }
        if self.limits.max_concurrent_calls == 0 {
            return Err(DeepRagError::Validation(
                "limits.max_concurrent_calls must be >= 1".to_string(),
            ));
        }
        if self.embeddings.dimension == 0 {
            return Err(DeepRagError::Validation(
                "embeddings.dimension must be > 0".to_string(),
            ));
        }

        for (name, endpoint) in [
            ("embeddings.endpoint", &self.embeddings.endpoint),
            ("llm.llm_endpoint", &self.llm.llm_endpoint),
        ] {
            url::Url::parse(endpoint).map_err(|e| {
                DeepRagError::ConfigError(format!("{name} is not a valid URL ({endpoint}): {e}"))
            })?;
        }

        Ok(())
    }

    /// Build the immutable per-strategy configuration for `mode`
    #[must_use]
    pub fn rag_config(&self, mode: RagMode) -> RagConfig {
        RagConfig {
            mode,
            chunk_size: self.rag.chunk_size,
            overlap: self.rag.overlap,
            top_k: self.rag.top_k,
            embedding_model: self.embeddings.model.clone(),
            enable_rerank: self.rag.enable_rerank,
            similarity_threshold: self.rag.similarity_threshold,
            max_context_length: self.rag.max_context_length,
        }
    }

    /// Get LLM endpoint
    pub fn llm_endpoint(&self) -> &str {
        &self.llm.llm_endpoint
    }

    /// Get LLM key
    pub fn llm_key(&self) -> &str {
        &self.llm.llm_key
    }

    /// Get LLM model
    pub fn llm_model(&self) -> &str {
        &self.llm.llm_model
    }

    /// Get embedding dimension
    pub fn embedding_dimension(&self) -> usize {
        self.embeddings.dimension
    }

    /// Get embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embeddings.model
    }

    /// Per-call provider timeout
    pub fn provider_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.limits.provider_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            llm: LlmConfig {
                llm_endpoint: "http://localhost:11434".to_string(),
                llm_key: "ollama".to_string(),
                llm_model: default_llm_model(),
                temperature: default_temperature(),
                max_tokens: default_max_tokens(),
            },
            rag: RagDefaults::default(),
            raptor: RaptorConfig::default(),
            crag: CragConfig::default(),
            deep_thinking: DeepThinkingConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}
