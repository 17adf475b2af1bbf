//! CLI command handlers
//!
//! - rag: ingest, query, hybrid and recommend
//! - info: strategy capabilities and configuration

pub mod info;
pub mod rag;

pub use info::*;
pub use rag::*;
