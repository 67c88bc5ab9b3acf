//! Service: HTTP API, persistence, daily todo sync and reminders.
//!
//! This crate provides the daylist service that handles:
//! - Owner-scoped todo CRUD over an axum JSON API
//! - Google sign-in and per-request access-token refresh
//! - A daily job turning calendar events into todos
//! - An evening reminder about unfinished todos
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use daylist_server::{AppState, ServerConfig, SqliteStore, http};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load()?;
//! let store = Arc::new(SqliteStore::connect(&config.database_url(), 5).await?);
//! let app = http::router(AppState::from_config(&config, store)?);
//! let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod commands;
mod config;
mod error;
pub mod http;
mod reminder;
mod scheduler;
mod secret;
mod signals;
mod state;
pub mod store;
mod sync;

#[cfg(test)]
mod testing;

pub use config::{
    DatabaseSettings, GoogleSettings, HttpSettings, ReminderSettings, ServerConfig, SyncSettings,
};
pub use error::{ServerError, ServerResult};
pub use reminder::{LogNotifier, Notifier, Reminder, ReminderJob, ReminderReport, ReminderResult};
pub use scheduler::{
    DailySchedule, Scheduler, SchedulerCommand, SchedulerHandle, SchedulerState,
    SharedSchedulerState,
};
pub use signals::ShutdownHandle;
pub use state::{AppSettings, AppState, PendingLogin};
pub use store::{MemoryStore, SqliteStore};
pub use sync::{SKIP_NO_ACCOUNT, SyncOutcome, SyncReport, TodoSyncEngine, UserSyncResult};
