//! CLI command definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use crate::models::RagMode;

#[derive(Parser)]
#[command(name = "deeprag")]
#[command(about = "Store documents and query them through interchangeable RAG strategies")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: config.toml, then config.example.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use hash embeddings and the extractive generator instead of network providers
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chunk, embed and store a document
    Ingest {
        /// File to ingest
        #[arg(short, long)]
        file: PathBuf,
        /// Strategy that indexes the document
        #[arg(short, long, value_enum, default_value = "basic")]
        mode: RagMode,
        /// Owner of the stored chunks
        #[arg(short, long, default_value = "default")]
        user: String,
        /// JSON snapshot the vector store is loaded from and saved to
        #[arg(short, long, default_value = "deeprag-store.json")]
        store: PathBuf,
    },
    /// Answer a question with one strategy
    Query {
        question: String,
        /// Strategy to use (default: recommended for the question)
        #[arg(short, long, value_enum)]
        mode: Option<RagMode>,
        #[arg(short, long, default_value = "default")]
        user: String,
        #[arg(short, long, default_value = "deeprag-store.json")]
        store: PathBuf,
        /// Print retrieved sources
        #[arg(long)]
        sources: bool,
    },
    /// Answer a question with several strategies concurrently
    Hybrid {
        question: String,
        /// Comma separated strategies, e.g. basic,crag
        #[arg(long, value_enum, value_delimiter = ',', default_value = "basic,crag")]
        modes: Vec<RagMode>,
        #[arg(short, long, default_value = "default")]
        user: String,
        #[arg(short, long, default_value = "deeprag-store.json")]
        store: PathBuf,
    },
    /// Suggest a strategy for a question
    Recommend { question: String },
    /// List strategies and their capabilities
    Modes,
    /// Show or validate the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Validate the configuration and exit
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let cli = Cli::parse_from(["deeprag", "query", "What is RAPTOR?", "--mode", "deep-thinking", "--offline"]);
        assert!(cli.offline);
        match cli.command {
            Commands::Query { question, mode, user, .. } => {
                assert_eq!(question, "What is RAPTOR?");
                assert_eq!(mode, Some(RagMode::DeepThinking));
                assert_eq!(user, "default");
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_parse_hybrid_modes() {
        let cli = Cli::parse_from(["deeprag", "hybrid", "q", "--modes", "basic,raptor,crag"]);
        match cli.command {
            Commands::Hybrid { modes, .. } => {
                assert_eq!(modes, vec![RagMode::Basic, RagMode::Raptor, RagMode::Crag]);
            }
            _ => panic!("expected hybrid command"),
        }
    }

    #[test]
    fn test_parse_config_defaults_to_show() {
        let cli = Cli::parse_from(["deeprag", "config"]);
        assert!(matches!(cli.command, Commands::Config { action: None }));
    }
}
