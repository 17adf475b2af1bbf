//! Retrieval-augmented generation strategies
//!
//! Every strategy implements [`RagStrategy`] on top of the shared [`StrategyCore`]:
//! - [`BasicRag`]: vector lookup with optional rerank
//! - [`RaptorRag`]: hierarchical summary tree over the chunks of a document
//! - [`CragRag`]: quality-gated retrieval with fallback and query refinement
//! - [`DeepThinkingRag`]: planned, policy-controlled multi-step research
//!
//! [`StrategyRegistry`] builds and caches instances and runs hybrid queries.
//!
//! # Examples
//!
//! ```rust,no_run
//! use deeprag::config::AppConfig;
//! use deeprag::models::RagMode;
//! use deeprag::rag::StrategyRegistry;
//! # async fn run(providers: deeprag::providers::Providers) {
//! let registry = StrategyRegistry::new(AppConfig::default(), providers);
//! let strategy = registry.get_or_create(RagMode::Crag, "default");
//! let result = strategy.query("Which river flows through Brazil?", "alice").await;
//! println!("{}", result.content);
//! # }
//! ```

pub mod basic;
pub mod chunking;
pub mod context;
pub mod crag;
pub mod deep_thinking;
pub mod raptor;
pub mod recommender;
pub mod registry;
pub mod strategy;

pub use basic::BasicRag;
pub use chunking::chunk_text;
pub use chunking::document_id;
pub use context::Citation;
pub use context::ContextAssembler;
pub use crag::CragRag;
pub use crag::QualityAssessor;
pub use crag::QualityGate;
pub use deep_thinking::DeepThinkingRag;
pub use raptor::RaptorRag;
pub use raptor::RaptorTree;
pub use recommender::ModeRecommender;
pub use registry::StrategyRegistry;
pub use registry::DEFAULT_INSTANCE;
pub use strategy::GenerationInput;
pub use strategy::GenerationSettings;
pub use strategy::RagStrategy;
pub use strategy::StrategyCore;
pub use strategy::INSUFFICIENT_INFORMATION;
