//! Ingest and query handlers

use std::path::Path;

use serde_json::json;

use crate::cli::output::print_info;
use crate::cli::output::print_recommendation;
use crate::cli::output::print_result;
use crate::cli::output::print_success;
use crate::cli::output::print_warning;
use crate::cli::session::Session;
use crate::errors::DeepRagError;
use crate::models::Metadata;
use crate::models::RagMode;
use crate::rag::DEFAULT_INSTANCE;
use crate::Result;

/// Handle ingest command
pub async fn handle_ingest(session: &Session, file: &Path, mode: RagMode, user: &str) -> Result<()> {
    let content = tokio::fs::read_to_string(file).await?;
    print_info(&format!(
        "Ingesting {} ({} bytes) with {} strategy",
        file.display(),
        content.len(),
        mode
    ));

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), json!(file.display().to_string()));

    let result = session
        .registry()
        .get_or_create(mode, DEFAULT_INSTANCE)
        .store(&content, user, &metadata)
        .await;
    if !result.success {
        return Err(DeepRagError::Custom(
            result.error.unwrap_or_else(|| "ingest failed".to_string()),
        ));
    }

    session.persist()?;
    print_success(&result.content);
    if let Some(warnings) = result.metadata.get("warnings").and_then(|w| w.as_array()) {
        print_warning(&format!("{} item(s) could not be stored", warnings.len()));
    }
    Ok(())
}

/// Handle query command; without a mode the recommended one is used
pub async fn handle_query(
    session: &Session,
    question: &str,
    mode: Option<RagMode>,
    user: &str,
    show_sources: bool,
) -> Result<()> {
    let mode = match mode {
        Some(mode) => mode,
        None => {
            let recommendation = session.registry().recommend_mode(question);
            print_info(&format!(
                "Using recommended mode {} (confidence {:.2})",
                recommendation.mode, recommendation.confidence
            ));
            recommendation.mode
        }
    };

    let result = session
        .registry()
        .get_or_create(mode, DEFAULT_INSTANCE)
        .query(question, user)
        .await;
    print_result(&result, show_sources);
    Ok(())
}

/// Handle hybrid command
pub async fn handle_hybrid(session: &Session, question: &str, modes: &[RagMode], user: &str) -> Result<()> {
    let result = session.registry().hybrid_query(question, user, modes).await;
    if let Some(failed) = result.metadata.get("failed_results").and_then(|f| f.as_array()) {
        for failure in failed {
            print_warning(&format!(
                "{} failed: {}",
                failure["mode"].as_str().unwrap_or("?"),
                failure["error"].as_str().unwrap_or("?")
            ));
        }
    }
    print_result(&result, false);
    Ok(())
}

/// Handle recommend command
pub fn handle_recommend(session: &Session, question: &str) {
    let recommendation = session.registry().recommend_mode(question);
    print_recommendation(question, &recommendation);
}
