//! CLI module for the `deeprag` binary
//!
//! - Command line argument parsing
//! - Provider and store wiring for a single invocation
//! - Command handlers (organized by domain in handlers/)
//! - Output formatting

pub mod commands;
pub mod handlers;
pub mod output;
pub mod session;

pub use commands::*;
pub use handlers::*;
pub use output::*;
pub use session::Session;
