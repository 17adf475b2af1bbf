use std::fmt;

use thiserror::Error;

/// External capability a provider error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Embedding,
    Generation,
    VectorStore,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding => write!(f, "embedding provider"),
            Self::Generation => write!(f, "generation provider"),
            Self::VectorStore => write!(f, "vector store"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DeepRagError {
    /// Bad configuration or empty query, rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable {
        provider: ProviderKind,
        message: String,
    },

    /// Non-fatal: triggers the fallback-to-best-available policy
    #[error("Quality below threshold: best candidate {best:.3} < {threshold:.3}")]
    QualityBelowThreshold { best: f32, threshold: f32 },

    /// Non-fatal: research proceeds to synthesis with partial evidence
    #[error("Research plan exhausted after {iterations} iteration(s)")]
    PlanExhausted { iterations: usize },

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl DeepRagError {
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: ProviderKind::Embedding,
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: ProviderKind::Generation,
            message: message.into(),
        }
    }

    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: ProviderKind::VectorStore,
            message: message.into(),
        }
    }

    /// Whether the error only degrades the current stage
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. }
                | Self::QualityBelowThreshold { .. }
                | Self::PlanExhausted { .. }
                | Self::HttpError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeepRagError>;
