//! Shared application state handed to every HTTP handler.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use daylist_core::CalendarWindowResolver;
use daylist_providers::{CalendarProvider, GoogleCalendarClient, OAuthClient, SessionTokenManager};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::reminder::{LogNotifier, Notifier, ReminderJob};
use crate::store::{AccountStore, SessionStore, Store, TodoStore};
use crate::sync::TodoSyncEngine;

/// How long a started sign-in may take before its PKCE verifier is dropped.
const PENDING_LOGIN_TTL: Duration = Duration::from_secs(600);

/// Deployment settings the HTTP layer and jobs need.
#[derive(Clone)]
pub struct AppSettings {
    pub resolver: CalendarWindowResolver,
    pub calendar_ids: Vec<String>,
    pub user_timeout: Duration,
    /// Public URL without trailing slash.
    pub base_url: String,
    pub redirect_uri: String,
    pub session_ttl: chrono::Duration,
    pub cron_secret: Option<SecretString>,
}

impl AppSettings {
    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        Ok(Self {
            resolver: CalendarWindowResolver::new(config.zone()?),
            calendar_ids: config.sync.calendar_ids.clone(),
            user_timeout: config.user_timeout(),
            base_url: config.server.base_url.trim_end_matches('/').to_string(),
            redirect_uri: config.redirect_uri(),
            session_ttl: config.session_ttl(),
            cron_secret: config.cron_secret()?.map(SecretString::new),
        })
    }
}

/// PKCE verifier of a sign-in waiting for its callback.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub verifier: String,
    pub started_at: DateTime<Utc>,
}

/// Collaborators and settings shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub todos: Arc<dyn TodoStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub oauth: Arc<OAuthClient>,
    pub tokens: SessionTokenManager,
    pub sync: Arc<TodoSyncEngine>,
    pub reminder: Arc<ReminderJob>,
    pub settings: Arc<AppSettings>,
    pending_logins: Arc<Mutex<HashMap<String, PendingLogin>>>,
}

impl AppState {
    /// Wires the store, Google clients and jobs together.
    ///
    /// Reminders go to a [`LogNotifier`]; see [`with_notifier`](Self::with_notifier).
    pub fn new<S>(
        store: Arc<S>,
        calendar: Arc<dyn CalendarProvider>,
        oauth: Arc<OAuthClient>,
        settings: AppSettings,
    ) -> Self
    where
        S: Store + 'static,
    {
        let todos: Arc<dyn TodoStore> = store.clone();
        let accounts: Arc<dyn AccountStore> = store.clone();
        let sessions: Arc<dyn SessionStore> = store;
        let tokens = SessionTokenManager::new(oauth.clone());

        let sync = TodoSyncEngine::new(
            accounts.clone(),
            todos.clone(),
            calendar.clone(),
            tokens.clone(),
            settings.resolver,
        )
        .with_calendar_ids(settings.calendar_ids.clone())
        .with_user_timeout(settings.user_timeout);

        let reminder = ReminderJob::new(
            todos.clone(),
            accounts.clone(),
            Arc::new(LogNotifier),
            settings.resolver,
        );

        Self {
            todos,
            accounts,
            sessions,
            calendar,
            oauth,
            tokens,
            sync: Arc::new(sync),
            reminder: Arc::new(reminder),
            settings: Arc::new(settings),
            pending_logins: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Builds the Google clients from `config` and wires them to `store`.
    pub fn from_config<S>(config: &ServerConfig, store: Arc<S>) -> ServerResult<Self>
    where
        S: Store + 'static,
    {
        let google = config.google_config()?;
        let calendar = Arc::new(GoogleCalendarClient::new(&google)?);
        let oauth = Arc::new(OAuthClient::new(google)?);
        Ok(Self::new(store, calendar, oauth, AppSettings::from_config(config)?))
    }

    /// Builder: deliver reminders through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.reminder = Arc::new(ReminderJob::new(
            self.todos.clone(),
            self.accounts.clone(),
            notifier,
            self.settings.resolver,
        ));
        self
    }

    pub fn resolver(&self) -> &CalendarWindowResolver {
        &self.settings.resolver
    }

    /// Whether `presented` matches the configured cron secret. Always true
    /// when none is configured.
    pub fn cron_authorized(&self, presented: Option<&str>) -> bool {
        match &self.settings.cron_secret {
            None => true,
            Some(secret) => presented.is_some_and(|p| secrets_match(p, secret.expose_secret())),
        }
    }

    /// Remembers the verifier of a sign-in started at `now`.
    pub fn start_login(&self, state: String, verifier: String, now: DateTime<Utc>) {
        let mut pending = self.pending_logins.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|_, login| !login_expired(login, now));
        pending.insert(
            state,
            PendingLogin {
                verifier,
                started_at: now,
            },
        );
    }

    /// Removes and returns the pending sign-in for `state` unless it expired.
    pub fn finish_login(&self, state: &str, now: DateTime<Utc>) -> Option<PendingLogin> {
        self.pending_logins
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(state)
            .filter(|login| !login_expired(login, now))
    }
}

fn login_expired(login: &PendingLogin, now: DateTime<Utc>) -> bool {
    (now - login.started_at)
        .to_std()
        .is_ok_and(|age| age > PENDING_LOGIN_TTL)
}

/// Compares SHA-256 digests so the running time depends on neither the
/// length nor the content of the configured secret.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_match_only_on_equal_values() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cre", "s3cret"));
        assert!(!secrets_match("s3creT", "s3cret"));
        assert!(!secrets_match("", "s3cret"));
    }

    #[test]
    fn pending_logins_expire_after_ten_minutes() {
        let started_at = Utc::now();
        let login = PendingLogin { verifier: "v".into(), started_at };
        assert!(!login_expired(&login, started_at + chrono::Duration::minutes(10)));
        assert!(login_expired(&login, started_at + chrono::Duration::minutes(11)));
    }
}
