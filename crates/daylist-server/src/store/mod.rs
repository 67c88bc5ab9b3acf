//! Persistence: todos, users with their Google accounts, and sessions.
//!
//! Two implementations share these traits: [`SqliteStore`] (sqlx) for the
//! service and [`MemoryStore`] for tests and throwaway runs.

mod memory;
mod sqlite;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::Serialize;

use daylist_core::{DayWindow, NewTodo, Todo};
use daylist_providers::TokenState;

use crate::error::{ServerError, ServerResult};

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, run_migrations};

/// A signed-up user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
}

/// A user's linked Google identity and its token state.
#[derive(Debug, Clone)]
pub struct GoogleAccount {
    /// OpenID `sub`.
    pub provider_account_id: String,
    pub token: TokenState,
    pub scope: Option<String>,
}

/// A user with their Google account, if linked.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user: User,
    pub account: Option<GoogleAccount>,
}

/// Everything learned from a completed Google sign-in.
#[derive(Debug, Clone)]
pub struct GoogleLogin {
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub token: TokenState,
    pub scope: Option<String>,
}

/// A browser or API session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Todo persistence.
#[async_trait]
pub trait TodoStore: Send + Sync {
    /// Todos of `owner` whose bucket falls in `window`, oldest first.
    async fn find_many(&self, owner: &str, window: &DayWindow) -> ServerResult<Vec<Todo>>;

    async fn create(&self, todo: NewTodo) -> ServerResult<Todo>;

    /// Creates a todo unless one with the same owner, date and source event
    /// already exists; returns `None` in that case.
    async fn create_from_event(&self, todo: NewTodo) -> ServerResult<Option<Todo>>;

    async fn set_completed(&self, id: &str, completed: bool) -> ServerResult<Option<Todo>>;

    /// Returns whether a row was deleted.
    async fn delete(&self, id: &str) -> ServerResult<bool>;

    async fn find_unique(&self, id: &str) -> ServerResult<Option<Todo>>;

    /// Incomplete todos of every user in `window`, oldest first.
    async fn find_incomplete(&self, window: &DayWindow) -> ServerResult<Vec<Todo>>;
}

/// Users and their Google accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Every user, with the Google account when linked.
    async fn users_with_accounts(&self) -> ServerResult<Vec<UserRecord>>;

    async fn find_user(&self, user_id: &str) -> ServerResult<Option<UserRecord>>;

    /// Creates or updates the user and account behind a Google sign-in.
    ///
    /// A refresh token missing from `login` keeps the stored one.
    async fn upsert_google_login(&self, login: GoogleLogin) -> ServerResult<User>;

    async fn save_token_state(&self, user_id: &str, token: &TokenState) -> ServerResult<()>;
}

/// Session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: &str, expires_at: DateTime<Utc>) -> ServerResult<Session>;

    /// The session behind `token` if it exists and has not expired at `now`.
    async fn find_session(&self, token: &str, now: DateTime<Utc>) -> ServerResult<Option<Session>>;

    async fn delete_session(&self, token: &str) -> ServerResult<bool>;
}

/// A store providing all three concerns.
pub trait Store: TodoStore + AccountStore + SessionStore {}

impl<T: TodoStore + AccountStore + SessionStore> Store for T {}

/// Outcome of an owner-checked mutation.
#[derive(Debug, thiserror::Error)]
pub enum OwnedError {
    #[error("Todo not found")]
    NotFound,
    #[error("Forbidden")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] ServerError),
}

async fn owned(store: &dyn TodoStore, caller: &str, id: &str) -> Result<Todo, OwnedError> {
    let todo = store.find_unique(id).await?.ok_or(OwnedError::NotFound)?;
    if !todo.is_owned_by(caller) {
        return Err(OwnedError::Forbidden);
    }
    Ok(todo)
}

/// Sets the completion flag if `caller` owns the todo.
pub async fn update_owned(
    store: &dyn TodoStore,
    caller: &str,
    id: &str,
    completed: bool,
) -> Result<Todo, OwnedError> {
    owned(store, caller, id).await?;
    store
        .set_completed(id, completed)
        .await?
        .ok_or(OwnedError::NotFound)
}

/// Deletes the todo if `caller` owns it.
pub async fn delete_owned(store: &dyn TodoStore, caller: &str, id: &str) -> Result<(), OwnedError> {
    owned(store, caller, id).await?;
    if store.delete(id).await? {
        Ok(())
    } else {
        Err(OwnedError::NotFound)
    }
}

/// Copies `owner`'s unfinished todos of `from` into the day starting at
/// `to_bucket`, optionally restricted to `ids`. Originals are untouched.
pub async fn carry_over(
    store: &dyn TodoStore,
    owner: &str,
    from: &DayWindow,
    to_bucket: DateTime<Utc>,
    ids: Option<&[String]>,
) -> ServerResult<Vec<Todo>> {
    let candidates = store.find_many(owner, from).await?;
    let mut created = Vec::new();
    for todo in candidates
        .into_iter()
        .filter(|t| !t.is_completed)
        .filter(|t| ids.is_none_or(|ids| ids.contains(&t.id)))
    {
        created.push(store.create(NewTodo::new(owner, todo.content, to_bucket)).await?);
    }
    Ok(created)
}

/// Current time truncated to the millisecond precision rows are stored with.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Random URL-safe session token.
pub(crate) fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
