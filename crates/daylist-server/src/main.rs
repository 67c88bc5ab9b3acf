//! daylist entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use daylist_core::{TracingConfig, TracingOutputFormat, init_tracing};
use daylist_server::cli::{Cli, Command, ConfigAction};
use daylist_server::commands;
use daylist_server::{ServerConfig, ServerResult};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) -> Result<(), daylist_core::TracingError> {
    let mut config = if cli.command.is_service() {
        TracingConfig::service()
    } else {
        TracingConfig::cli()
    };
    if cli.debug {
        config = config.with_level(Level::DEBUG);
    }
    if let Some(ref format) = cli.log_format {
        config = config.with_format(format.parse::<TracingOutputFormat>()?);
    }
    init_tracing(config)
}

async fn run(cli: Cli) -> ServerResult<()> {
    let path = cli.config.clone().unwrap_or_else(ServerConfig::default_path);
    let mut config = if cli.config.is_some() {
        ServerConfig::load_from(&path)?
    } else {
        ServerConfig::load()?
    };
    config.apply_env();

    match cli.command {
        Command::Serve => commands::serve::run(&config).await,
        Command::Sync { date } => commands::jobs::sync(&config, date.as_deref()).await,
        Command::Remind => commands::jobs::remind(&config).await,
        Command::Migrate => commands::jobs::migrate(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&path),
        },
    }
}
