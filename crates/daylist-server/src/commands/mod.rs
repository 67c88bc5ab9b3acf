//! Implementations of the `daylist` subcommands.

pub mod config;
pub mod jobs;
pub mod serve;

use std::sync::Arc;

use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::store::SqliteStore;

/// Opens the configured database, creating the default data directory when
/// no explicit URL is set.
pub async fn open_store(config: &ServerConfig) -> ServerResult<Arc<SqliteStore>> {
    if config.database.url.is_none() {
        let dir = ServerConfig::default_data_dir();
        std::fs::create_dir_all(&dir)?;
        debug!(path = %dir.display(), "using default data directory");
    }
    let store = SqliteStore::connect(&config.database_url(), config.database.max_connections).await?;
    Ok(Arc::new(store))
}
