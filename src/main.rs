use clap::Parser;
use deeprag::cli::handle_config_command;
use deeprag::cli::handle_hybrid;
use deeprag::cli::handle_ingest;
use deeprag::cli::handle_modes;
use deeprag::cli::handle_query;
use deeprag::cli::handle_recommend;
use deeprag::cli::session::load_config;
use deeprag::cli::Cli;
use deeprag::cli::Commands;
use deeprag::cli::Session;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize logging
    if cli.verbose {
        deeprag::logging::init_logging_with_level("debug")?;
    } else {
        deeprag::logging::init_logging_with_config(Some(&config))?;
    }
    info!("Configuration loaded successfully");

    // Execute the requested command
    match cli.command {
        Commands::Ingest {
            file,
            mode,
            user,
            store,
        } => {
            let session = Session::open(config, cli.offline, Some(store))?;
            handle_ingest(&session, &file, mode, &user).await?;
        }
        Commands::Query {
            question,
            mode,
            user,
            store,
            sources,
        } => {
            let session = Session::open(config, cli.offline, Some(store))?;
            handle_query(&session, &question, mode, &user, sources).await?;
        }
        Commands::Hybrid {
            question,
            modes,
            user,
            store,
        } => {
            let session = Session::open(config, cli.offline, Some(store))?;
            handle_hybrid(&session, &question, &modes, &user).await?;
        }
        Commands::Recommend { question } => {
            let session = Session::open(config, cli.offline, None)?;
            handle_recommend(&session, &question);
        }
        Commands::Modes => {
            let session = Session::open(config, cli.offline, None)?;
            handle_modes(&session);
        }
        Commands::Config { action } => {
            handle_config_command(&config, action)?;
        }
    }

    Ok(())
}
