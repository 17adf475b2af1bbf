//! CLI output formatting utilities

use crate::models::Capabilities;
use crate::models::ModeRecommendation;
use crate::models::RagResult;
use crate::AppConfig;

/// Truncate at a character boundary, appending "..." when shortened
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

/// Print an answer with its warnings and timing
pub fn print_result(result: &RagResult, show_sources: bool) {
    if !result.success {
        print_error(&format!(
            "{} failed: {}",
            result.mode_used,
            result.error.as_deref().unwrap_or("unknown error")
        ));
        return;
    }

    println!("{}", result.content.trim());
    println!();

    if let Some(warnings) = result.metadata.get("warnings").and_then(|w| w.as_array()) {
        for warning in warnings.iter().filter_map(|w| w.as_str()) {
            print_warning(warning);
        }
    }

    if show_sources {
        print_sources(result);
    }

    println!(
        "🧭 Mode: {} | Sources: {} | Time: {:.2}s",
        result.mode_used,
        result.sources.len(),
        result.processing_time
    );
}

pub fn print_sources(result: &RagResult) {
    println!("📚 Sources ({}):", result.sources.len());
    for (i, source) in result.sources.iter().enumerate() {
        println!(
            "  [{}] {:.3} {} | {}",
            i + 1,
            source.score,
            source.id().unwrap_or("-"),
            truncate_str(&source.text.replace('\n', " "), 100)
        );
    }
    println!();
}

/// Capability table, one strategy per row
pub fn print_capabilities(capabilities: &[Capabilities]) {
    println!(
        "{:<14} {:<20} {:<10} {:<10} Features",
        "Mode", "Name", "Complexity", "Resources"
    );
    println!("{}", "-".repeat(80));
    for c in capabilities {
        println!(
            "{:<14} {:<20} {:<10} {:<10} {}",
            c.mode.as_str(),
            c.name,
            c.complexity.to_string(),
            c.resource_usage.to_string(),
            c.features.join(", ")
        );
    }
}

pub fn print_recommendation(question: &str, recommendation: &ModeRecommendation) {
    println!("❓ {}", truncate_str(question, 100));
    println!(
        "💡 Recommended mode: {} (confidence {:.2})",
        recommendation.mode, recommendation.confidence
    );
    for reason in &recommendation.reasons {
        println!("  - {reason}");
    }
}

/// Print configuration; the API key is masked
pub fn print_config(config: &AppConfig) {
    println!("📋 DeepRAG Configuration:");
    println!();

    println!("📝 Logging:");
    println!("  Level: {}", config.logging.level);
    println!("  Directory: {}", config.logging.log_dir);
    println!();

    println!("🧠 Embeddings:");
    println!("  Backend: {}", config.embeddings.backend);
    println!("  Endpoint: {}", config.embeddings.endpoint);
    println!("  Model: {}", config.embedding_model());
    println!("  Dimension: {}", config.embedding_dimension());
    println!();

    println!("🤖 LLM:");
    println!("  Endpoint: {}", config.llm_endpoint());
    println!("  Model: {}", config.llm_model());
    println!("  Key: {}", mask_secret(config.llm_key()));
    println!(
        "  Temperature: {} | Max tokens: {}",
        config.llm.temperature, config.llm.max_tokens
    );
    println!();

    println!("🔎 Retrieval:");
    println!(
        "  Chunk size: {} | Overlap: {} | Top k: {}",
        config.rag.chunk_size, config.rag.overlap, config.rag.top_k
    );
    println!(
        "  Similarity threshold: {} | Rerank: {} | Max context: {}",
        config.rag.similarity_threshold, config.rag.enable_rerank, config.rag.max_context_length
    );
    println!();

    println!("🌳 RAPTOR:");
    println!(
        "  Cluster threshold: {} | Max levels: {}",
        config.raptor.cluster_threshold, config.raptor.max_levels
    );
    println!();

    println!("✔️  CRAG:");
    println!(
        "  Quality threshold: {} | Refinement: {}",
        config.crag.quality_threshold, config.crag.enable_refinement
    );
    println!();

    println!("🧩 Deep thinking:");
    let dt = &config.deep_thinking;
    println!(
        "  Max iterations: {} | Complexity threshold: {} | Finish confidence: {}",
        dt.max_reasoning_iterations, dt.complexity_threshold, dt.finish_confidence
    );
    println!(
        "  Recall k: {} | Rerank k: {} | Distillation: {} | LLM policy: {}",
        dt.recall_k, dt.rerank_k, dt.enable_distillation, dt.use_llm_policy
    );
    println!();

    println!("⏱️  Limits:");
    println!(
        "  Max concurrent calls: {} | Provider timeout: {}s",
        config.limits.max_concurrent_calls, config.limits.provider_timeout_secs
    );
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}

pub fn print_info(msg: &str) {
    println!("ℹ️  {msg}");
}

pub fn print_success(msg: &str) {
    println!("✅ {msg}");
}

pub fn print_warning(msg: &str) {
    println!("⚠️  {msg}");
}

pub fn print_error(msg: &str) {
    println!("❌ {msg}");
}
