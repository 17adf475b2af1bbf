//! Information display handlers (capabilities, config)

use crate::cli::commands::ConfigCommands;
use crate::cli::output::print_capabilities;
use crate::cli::output::print_config;
use crate::cli::output::print_success;
use crate::cli::session::Session;
use crate::AppConfig;
use crate::Result;

/// Handle modes command
pub fn handle_modes(session: &Session) {
    print_capabilities(&session.registry().capabilities());
}

/// Handle config command
pub fn handle_config_command(config: &AppConfig, action: Option<ConfigCommands>) -> Result<()> {
    match action.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => print_config(config),
        ConfigCommands::Validate => {
            config.validate()?;
            print_success("Configuration is valid");
        }
    }
    Ok(())
}
