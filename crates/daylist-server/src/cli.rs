//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// daylist - Google Calendar events as your daily todo list
#[derive(Debug, Parser)]
#[command(name = "daylist")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "DAYLIST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, env = "DAYLIST_LOG_FORMAT")]
    pub log_format: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API and the daily jobs
    Serve,

    /// Create today's todos from calendar events once and print the report
    Sync {
        /// Day to sync (YYYY-MM-DD) instead of today
        #[arg(long)]
        date: Option<String>,
    },

    /// Send the unfinished-todo reminder once and print the report
    Remind,

    /// Apply database migrations
    Migrate,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

impl Command {
    /// Long-running commands log as a service, the rest as a CLI.
    pub fn is_service(&self) -> bool {
        matches!(self, Self::Serve)
    }
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration with secrets masked
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
