//! Configuration commands.

use std::path::Path;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Dump the effective configuration to stdout, secrets masked.
pub fn dump(config: &ServerConfig, path: &Path) -> ServerResult<()> {
    let toml_str = toml::to_string_pretty(&config.redacted())
        .map_err(|e| ServerError::config(format!("failed to serialize config: {e}")))?;
    println!("# config.toml ({})", path.display());
    println!("{toml_str}");
    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ServerConfig) -> ServerResult<()> {
    config.validate()?;
    println!("Google credentials are valid.");
    println!(
        "Todo sync runs at '{}' and reminders at '{}' ({}).",
        config.sync.schedule, config.reminder.schedule, config.sync.timezone
    );
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ServerResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
