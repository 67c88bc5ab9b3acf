//! Evening reminder about unfinished todos.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use daylist_core::{CalendarWindowResolver, Todo};

use crate::error::ServerResult;
use crate::store::{AccountStore, TodoStore};

/// One user's unfinished todos of the day.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub user_id: String,
    pub email: Option<String>,
    pub date: NaiveDate,
    pub incomplete_todos: usize,
    pub items: Vec<Todo>,
}

/// Delivers reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `reminder` and returns the status recorded for it.
    async fn notify(&self, reminder: &Reminder) -> Result<String, String>;
}

/// Notifier that only writes the reminder to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, reminder: &Reminder) -> Result<String, String> {
        info!(
            user_id = %reminder.user_id,
            email = reminder.email.as_deref().unwrap_or("-"),
            date = %reminder.date,
            incomplete_todos = reminder.incomplete_todos,
            "you still have unfinished todos today"
        );
        Ok("notification_logged".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderResult {
    pub user_id: String,
    pub email: Option<String>,
    pub incomplete_todos: usize,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReport {
    pub date: NaiveDate,
    /// Reminders the notifier accepted.
    pub notifications_sent: usize,
    pub total_incomplete_todos: usize,
    pub results: Vec<ReminderResult>,
}

/// Groups today's unfinished todos per user and notifies each user once.
pub struct ReminderJob {
    todos: Arc<dyn TodoStore>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    resolver: CalendarWindowResolver,
}

impl ReminderJob {
    pub fn new(
        todos: Arc<dyn TodoStore>,
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        resolver: CalendarWindowResolver,
    ) -> Self {
        Self {
            todos,
            accounts,
            notifier,
            resolver,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> ServerResult<ReminderReport> {
        let window = self.resolver.today(now);
        let open = self.todos.find_incomplete(&window).await?;
        let total_incomplete_todos = open.len();

        let mut by_owner: BTreeMap<String, Vec<Todo>> = BTreeMap::new();
        for todo in open {
            by_owner.entry(todo.owner_user_id.clone()).or_default().push(todo);
        }

        let mut results = Vec::with_capacity(by_owner.len());
        for (user_id, items) in by_owner {
            let email = match self.accounts.find_user(&user_id).await {
                Ok(record) => record.map(|r| r.user.email),
                Err(e) => {
                    warn!(%user_id, error = %e, "failed to look up reminder recipient");
                    None
                }
            };
            let reminder = Reminder {
                user_id,
                email,
                date: window.date,
                incomplete_todos: items.len(),
                items,
            };

            let (status, error) = match self.notifier.notify(&reminder).await {
                Ok(status) => (status, None),
                Err(e) => {
                    warn!(user_id = %reminder.user_id, error = %e, "reminder delivery failed");
                    ("error".to_string(), Some(e))
                }
            };
            results.push(ReminderResult {
                user_id: reminder.user_id,
                email: reminder.email,
                incomplete_todos: reminder.incomplete_todos,
                status,
                error,
            });
        }

        let notifications_sent = results.iter().filter(|r| r.error.is_none()).count();
        info!(
            date = %window.date,
            notifications_sent,
            total_incomplete_todos,
            "reminder run finished"
        );
        Ok(ReminderReport {
            date: window.date,
            notifications_sent,
            total_incomplete_todos,
            results,
        })
    }
}
