pub mod cli;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod models;
pub mod providers;
pub mod rag;
pub mod vector_store;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
pub mod tests;

pub use config::AppConfig;
pub use errors::*;
pub use providers::Providers;
pub use rag::RagStrategy;
pub use rag::StrategyRegistry;
