//! Shared data model for strategies, the registry and the research loop

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::errors::DeepRagError;
use crate::errors::Result;

/// Free-form provenance / diagnostics attached to sources and results
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Retrieval/generation strategy identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RagMode {
    /// Plain vector lookup
    Basic,
    /// Hierarchical summarization tree
    Raptor,
    /// Quality-gated retrieval with refinement
    Crag,
    /// Iterative multi-step research
    DeepThinking,
}

impl RagMode {
    pub const ALL: [Self; 4] = [Self::Basic, Self::Raptor, Self::Crag, Self::DeepThinking];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Raptor => "raptor",
            Self::Crag => "crag",
            Self::DeepThinking => "deep_thinking",
        }
    }
}

impl fmt::Display for RagMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RagMode {
    type Err = DeepRagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "basic" => Ok(Self::Basic),
            "raptor" => Ok(Self::Raptor),
            "crag" => Ok(Self::Crag),
            "deep_thinking" | "deepthinking" | "deep" => Ok(Self::DeepThinking),
            other => Err(DeepRagError::Validation(format!("unknown RAG mode: {other}"))),
        }
    }
}

/// A bounded slice of source text; offsets are byte offsets into the original
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// Per-instance strategy configuration, immutable after construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub mode: RagMode,
    pub chunk_size: usize,
    pub overlap: usize,
    pub top_k: usize,
    pub embedding_model: String,
    pub enable_rerank: bool,
    pub similarity_threshold: f32,
    pub max_context_length: usize,
}

impl RagConfig {
    #[must_use]
    pub fn new(mode: RagMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Reject malformed configuration before any work starts
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(DeepRagError::Validation("top_k must be >= 1".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(DeepRagError::Validation(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(DeepRagError::Validation(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(DeepRagError::Validation(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_context_length == 0 {
            return Err(DeepRagError::Validation(
                "max_context_length must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            mode: RagMode::Basic,
            chunk_size: 1000,
            overlap: 200,
            top_k: 5,
            embedding_model: "nomic-embed-text".to_string(),
            enable_rerank: false,
            similarity_threshold: 0.0,
            max_context_length: 8000,
        }
    }
}

/// A retrieved evidence unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSource {
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RagSource {
    /// Identifier recorded in metadata, if any
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.metadata.get("id").and_then(serde_json::Value::as_str)
    }
}

/// Uniform return value of every contract operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResult {
    pub success: bool,
    pub content: String,
    pub sources: Vec<RagSource>,
    pub metadata: Metadata,
    pub mode_used: RagMode,
    /// Seconds spent producing this result
    pub processing_time: f64,
    pub error: Option<String>,
}

impl RagResult {
    #[must_use]
    pub fn success(mode: RagMode) -> Self {
        Self {
            success: true,
            content: String::new(),
            sources: Vec::new(),
            metadata: Metadata::new(),
            mode_used: mode,
            processing_time: 0.0,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(mode: RagMode, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(mode)
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub fn with_sources(mut self, sources: Vec<RagSource>) -> Self {
        self.sources = sources;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn timed(mut self, started: std::time::Instant) -> Self {
        self.processing_time = started.elapsed().as_secs_f64();
        self
    }

    /// Append a degradation note without failing the result
    pub fn record_warning(&mut self, warning: impl Into<String>) {
        let entry = self
            .metadata
            .entry("warnings".to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(items) = entry {
            items.push(serde_json::Value::String(warning.into()));
        }
    }
}

/// Node of a RAPTOR summarization tree; relations are id references into a flat arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub node_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    pub level: u32,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl TreeNode {
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Per-candidate CRAG quality judgement; never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub relevance: f32,
    pub completeness: f32,
    pub accuracy: f32,
    pub overall: f32,
    pub needs_refinement: bool,
    pub suggestions: Vec<String>,
}

/// One completed iteration of the deep-thinking loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchStep {
    pub step_index: usize,
    pub sub_question: String,
    pub summary: String,
    pub sources_count: usize,
    pub quality_score: f32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Continue,
    Revise,
    Finish,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "CONTINUE"),
            Self::Revise => write!(f, "REVISE"),
            Self::Finish => write!(f, "FINISH"),
        }
    }
}

impl FromStr for PolicyAction {
    type Err = DeepRagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "CONTINUE" => Ok(Self::Continue),
            "REVISE" => Ok(Self::Revise),
            "FINISH" => Ok(Self::Finish),
            other => Err(DeepRagError::Validation(format!(
                "unknown policy action: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub action: PolicyAction,
    pub confidence: f32,
    pub justification: String,
}

/// Coarse cost/complexity tier reported by `get_capabilities`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Strategy descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub name: String,
    pub mode: RagMode,
    pub features: Vec<String>,
    pub complexity: Tier,
    pub resource_usage: Tier,
}

/// Suggested mode for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeRecommendation {
    pub mode: RagMode,
    pub confidence: f32,
    pub reasons: Vec<String>,
}
