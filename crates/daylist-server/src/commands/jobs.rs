//! One-shot job commands: `sync`, `remind` and `migrate`.

use chrono::Utc;
use tracing::info;

use daylist_core::parse_date;

use super::open_store;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Runs the todo sync once and prints its JSON report.
pub async fn sync(config: &ServerConfig, date: Option<&str>) -> ServerResult<()> {
    let state = AppState::from_config(config, open_store(config).await?)?;
    let now = Utc::now();
    let date = match date {
        Some(raw) => parse_date(raw).map_err(|e| ServerError::config(format!("--date: {e}")))?,
        None => state.resolver().zone().today(now),
    };

    let report = state.sync.run_for(date, now).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Runs the reminder once and prints its JSON report.
pub async fn remind(config: &ServerConfig) -> ServerResult<()> {
    let state = AppState::from_config(config, open_store(config).await?)?;
    let report = state.reminder.run(Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Applies pending migrations.
pub async fn migrate(config: &ServerConfig) -> ServerResult<()> {
    open_store(config).await?;
    info!(url = %config.database_url(), "migrations applied");
    println!("Database is up to date.");
    Ok(())
}
