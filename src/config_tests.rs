//! Unit tests for configuration module
//!
//! These tests validate configuration parsing, defaults, and validation.

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::config::*;
    use crate::models::RagMode;

    const MINIMAL_TOML: &str = r#"
[llm]
llm_endpoint = "http://localhost:11434"
llm_key = "ollama"
"#;

    // ====== Default Value Tests ======

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.llm_model(), "gemma3:27b");
        assert_eq!(config.embedding_dimension(), 768);
    }

    #[test]
    fn test_minimal_toml_fills_section_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL_TOML).unwrap();
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.chunk_size, 1000);
        assert_eq!(config.raptor.max_levels, 3);
        assert!((config.crag.quality_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.deep_thinking.max_reasoning_iterations, 5);
        assert_eq!(config.limits.max_concurrent_calls, 8);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.embeddings.backend, "ollama");
    }

    #[test]
    fn test_missing_llm_section_is_rejected() {
        let result = AppConfig::from_toml_str("[rag]\ntop_k = 3\n");
        assert!(result.is_err());
    }

    // ====== Validation Tests ======

    #[test]
    fn test_zero_top_k_is_rejected() {
        let mut config = AppConfig::default();
        config.rag.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut config = AppConfig::default();
        config.rag.chunk_size = 100;
        config.rag.overlap = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let mut config = AppConfig::default();
        config.crag.quality_threshold = 1.2;
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("crag.quality_threshold"));
    }

    #[test]
    fn test_zero_iterations_is_rejected() {
        let mut config = AppConfig::default();
        config.deep_thinking.max_reasoning_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rerank_width_cannot_exceed_recall_width() {
        let mut config = AppConfig::default();
        config.deep_thinking.recall_k = 3;
        config.deep_thinking.rerank_k = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let mut config = AppConfig::default();
        config.llm.llm_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    // ====== Derived RagConfig Tests ======

    #[test]
    fn test_rag_config_carries_mode_and_defaults() {
        let mut config = AppConfig::default();
        config.rag.top_k = 7;
        config.rag.enable_rerank = true;

        let rag = config.rag_config(RagMode::Crag);
        assert_eq!(rag.mode, RagMode::Crag);
        assert_eq!(rag.top_k, 7);
        assert!(rag.enable_rerank);
        assert_eq!(rag.embedding_model, config.embedding_model());
    }

    // ====== File Loading Tests ======

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "{MINIMAL_TOML}\n[rag]\ntop_k = 9\n\n[raptor]\ncluster_threshold = 0.6\n"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rag.top_k, 9);
        assert!((config.raptor.cluster_threshold - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_from_missing_file() {
        let result = AppConfig::from_file("/nonexistent/deeprag.toml");
        assert!(matches!(result, Err(crate::DeepRagError::Io(_))));
    }

    #[test]
    fn test_provider_timeout() {
        let mut config = AppConfig::default();
        config.limits.provider_timeout_secs = 12;
        assert_eq!(config.provider_timeout().as_secs(), 12);
    }
}
