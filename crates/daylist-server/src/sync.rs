//! Daily creation of todos from calendar events.
//!
//! [`TodoSyncEngine::run`] walks every user once. Each user ends with exactly
//! one [`SyncOutcome`]; a failing user never stops the batch. Todo creation
//! is keyed by `(user, date, event id)`, so running the job twice for the
//! same day creates nothing new.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use daylist_core::{CalendarInfo, CalendarWindowResolver, NewTodo};
use daylist_providers::{CalendarProvider, SessionTokenManager, fetch_merged_events};

use crate::error::ServerResult;
use crate::store::{AccountStore, TodoStore, UserRecord};

/// Reason recorded for users that cannot be synced.
pub const SKIP_NO_ACCOUNT: &str = "No Google account or access token";

/// Result of one user's sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
    Success {
        #[serde(rename = "todosCreated")]
        todos_created: usize,
        #[serde(rename = "duplicatesSkipped")]
        duplicates_skipped: usize,
    },
    Skipped {
        reason: String,
    },
    Error {
        error: String,
    },
}

impl SyncOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSyncResult {
    pub user_id: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub date: NaiveDate,
    pub processed_users: usize,
    pub results: Vec<UserSyncResult>,
}

impl SyncReport {
    pub fn count(&self, status: &str) -> usize {
        self.results.iter().filter(|r| r.outcome.status() == status).count()
    }
}

/// Turns each user's calendar events of the day into todos.
pub struct TodoSyncEngine {
    accounts: Arc<dyn AccountStore>,
    todos: Arc<dyn TodoStore>,
    provider: Arc<dyn CalendarProvider>,
    tokens: SessionTokenManager,
    resolver: CalendarWindowResolver,
    calendar_ids: Vec<String>,
    user_timeout: Duration,
}

impl TodoSyncEngine {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        todos: Arc<dyn TodoStore>,
        provider: Arc<dyn CalendarProvider>,
        tokens: SessionTokenManager,
        resolver: CalendarWindowResolver,
    ) -> Self {
        Self {
            accounts,
            todos,
            provider,
            tokens,
            resolver,
            calendar_ids: vec!["primary".to_string()],
            user_timeout: Duration::from_secs(60),
        }
    }

    /// Builder: calendars synced for every user.
    pub fn with_calendar_ids(mut self, ids: Vec<String>) -> Self {
        if !ids.is_empty() {
            self.calendar_ids = ids;
        }
        self
    }

    /// Builder: upper bound on one user's sync.
    pub fn with_user_timeout(mut self, timeout: Duration) -> Self {
        self.user_timeout = timeout;
        self
    }

    /// Syncs today's events (in the reference zone) for every user.
    pub async fn run(&self, now: DateTime<Utc>) -> ServerResult<SyncReport> {
        self.run_for(self.resolver.zone().today(now), now).await
    }

    /// Syncs the events of `date` for every user.
    ///
    /// Fails only when the user list itself cannot be read.
    pub async fn run_for(&self, date: NaiveDate, now: DateTime<Utc>) -> ServerResult<SyncReport> {
        let users = self.accounts.users_with_accounts().await?;
        info!(%date, users = users.len(), "starting todo sync");

        let mut results = Vec::with_capacity(users.len());
        for record in &users {
            let outcome = match tokio::time::timeout(self.user_timeout, self.sync_user(record, date, now)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(message)) => SyncOutcome::error(message),
                Err(_) => SyncOutcome::error(format!(
                    "timed out after {}s",
                    self.user_timeout.as_secs_f64()
                )),
            };

            match &outcome {
                SyncOutcome::Success { todos_created, duplicates_skipped } => {
                    debug!(user_id = %record.user.id, todos_created, duplicates_skipped, "user synced");
                }
                SyncOutcome::Skipped { reason } => {
                    debug!(user_id = %record.user.id, %reason, "user skipped");
                }
                SyncOutcome::Error { error } => {
                    warn!(user_id = %record.user.id, %error, "user sync failed");
                }
            }

            results.push(UserSyncResult {
                user_id: record.user.id.clone(),
                outcome,
            });
        }

        let report = SyncReport {
            date,
            processed_users: users.len(),
            results,
        };
        info!(
            %date,
            success = report.count("success"),
            skipped = report.count("skipped"),
            error = report.count("error"),
            "todo sync finished"
        );
        Ok(report)
    }

    async fn sync_user(&self, record: &UserRecord, date: NaiveDate, now: DateTime<Utc>) -> Result<SyncOutcome, String> {
        let Some(account) = record
            .account
            .as_ref()
            .filter(|a| !a.token.access_token.is_empty())
        else {
            return Ok(SyncOutcome::Skipped {
                reason: SKIP_NO_ACCOUNT.to_string(),
            });
        };
        let user_id = &record.user.id;

        let materialized = self.tokens.materialize(account.token.clone(), now).await;
        if materialized.outcome.changed() {
            self.accounts
                .save_token_state(user_id, &materialized.state)
                .await
                .map_err(|e| format!("failed to store token state: {e}"))?;
        }
        let state = materialized.state;
        if state.needs_reauth() {
            return Err(format!(
                "re-authentication required ({})",
                state.error_reason.as_deref().unwrap_or("token refresh failed")
            ));
        }
        let Some(access_token) = state.usable_access_token(now) else {
            return Err("access token expired and no refresh token; re-authentication required".to_string());
        };

        let calendars: Vec<CalendarInfo> = self
            .calendar_ids
            .iter()
            .map(|id| CalendarInfo::new(id.clone(), id.clone()))
            .collect();
        let merged = fetch_merged_events(self.provider.as_ref(), access_token, &calendars, &self.resolver, date).await;
        if merged.all_failed() {
            let first = merged
                .failures
                .first()
                .map(|f| f.error.to_string())
                .unwrap_or_default();
            return Err(format!("calendar fetch failed: {first}"));
        }

        let bucket = self.resolver.bucket_instant(date);
        let mut todos_created = 0;
        let mut duplicates_skipped = 0;
        for event in &merged.events {
            let todo = NewTodo::new(user_id.clone(), event.todo_content(), bucket).with_source_event(event.id.clone());
            match self.todos.create_from_event(todo).await {
                Ok(Some(_)) => todos_created += 1,
                Ok(None) => duplicates_skipped += 1,
                Err(e) => return Err(format!("failed to store todo: {e}")),
            }
        }

        Ok(SyncOutcome::Success {
            todos_created,
            duplicates_skipped,
        })
    }
}
