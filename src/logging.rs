//! Logging configuration for DeepRAG

use std::path::Path;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{
    self,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::config::AppConfig;
use crate::Result;

const LOG_FILE_PREFIX: &str = "deeprag.log";

/// Initialize logging system with file output
pub fn init_logging() -> Result<()> {
    init_logging_with_config(None)
}

/// Initialize logging with configuration
pub fn init_logging_with_config(config: Option<&AppConfig>) -> Result<()> {
    let (level, log_dir) = config.map_or_else(
        || ("info".to_string(), "logs".to_string()),
        |c| (c.logging.level.clone(), c.logging.log_dir.clone()),
    );

    // Config wins; otherwise RUST_LOG, otherwise a sensible default
    let env_filter = if config.is_some() {
        EnvFilter::new(format!("{level},deeprag={level}"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,deeprag=debug"))
    };

    install(env_filter, &log_dir)?;

    tracing::info!(
        "Logging initialized with level: {} - console and file output enabled",
        level
    );
    tracing::info!("Log files will be saved to: {}/{}.YYYY-MM-DD", log_dir, LOG_FILE_PREFIX);
    Ok(())
}

/// Initialize logging with custom log level
pub fn init_logging_with_level(level: &str) -> Result<()> {
    let env_filter = EnvFilter::new(format!("{level},deeprag={level}"));
    install(env_filter, "logs")?;

    tracing::info!(
        "Logging initialized with level: {} - console and file output enabled",
        level
    );
    Ok(())
}

/// Initialize simple logging for testing
pub fn init_simple_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_max_level(tracing::Level::INFO)
        .try_init()
        .map_err(|e| crate::DeepRagError::Custom(format!("logging already initialized: {e}")))?;

    tracing::info!("Simple logging initialized");
    Ok(())
}

fn install(env_filter: EnvFilter, log_dir: &str) -> Result<()> {
    // Create logs directory if it doesn't exist
    let logs_dir = Path::new(log_dir);
    if !logs_dir.exists() {
        std::fs::create_dir_all(logs_dir)?;
    }

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false); // No colors in file

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::DeepRagError::Custom(format!("logging already initialized: {e}")))?;

    // The worker must outlive every log call in the process
    std::mem::forget(guard);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_initialization_does_not_panic() {
        let _ = init_simple_logging();
        let second = init_simple_logging();
        assert!(second.is_err());
    }
}
