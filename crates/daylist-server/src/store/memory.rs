//! In-memory store for tests and throwaway runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use daylist_core::{DayWindow, NewTodo, Todo};
use daylist_providers::TokenState;

use super::{
    AccountStore, GoogleAccount, GoogleLogin, Session, SessionStore, TodoStore, User, UserRecord,
    generate_session_token, now_millis,
};
use crate::error::ServerResult;

#[derive(Default)]
struct Inner {
    /// Insertion order doubles as the `created_at` tie-break.
    todos: Vec<Todo>,
    users: Vec<User>,
    accounts: HashMap<String, GoogleAccount>,
    sessions: HashMap<String, Session>,
}

/// Keeps everything in process memory behind one mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a user without a Google account.
    pub fn insert_user(&self, user: User) {
        self.lock().users.push(user);
    }

    fn record(inner: &Inner, user: &User) -> UserRecord {
        UserRecord {
            user: user.clone(),
            account: inner.accounts.get(&user.id).cloned(),
        }
    }
}

fn in_window(todo: &Todo, window: &DayWindow) -> bool {
    todo.date >= window.start && todo.date < window.end
}

fn sorted(mut todos: Vec<Todo>) -> Vec<Todo> {
    todos.sort_by_key(|t| t.created_at);
    todos
}

fn build(todo: NewTodo) -> Todo {
    Todo {
        id: uuid::Uuid::new_v4().to_string(),
        owner_user_id: todo.owner_user_id,
        content: todo.content,
        date: todo.date,
        is_completed: false,
        created_at: now_millis(),
        source_event_id: todo.source_event_id,
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn find_many(&self, owner: &str, window: &DayWindow) -> ServerResult<Vec<Todo>> {
        let inner = self.lock();
        Ok(sorted(
            inner
                .todos
                .iter()
                .filter(|t| t.is_owned_by(owner) && in_window(t, window))
                .cloned()
                .collect(),
        ))
    }

    async fn create(&self, todo: NewTodo) -> ServerResult<Todo> {
        let todo = build(todo);
        self.lock().todos.push(todo.clone());
        Ok(todo)
    }

    async fn create_from_event(&self, todo: NewTodo) -> ServerResult<Option<Todo>> {
        let mut inner = self.lock();
        let duplicate = todo.source_event_id.is_some()
            && inner.todos.iter().any(|t| {
                t.owner_user_id == todo.owner_user_id
                    && t.date == todo.date
                    && t.source_event_id == todo.source_event_id
            });
        if duplicate {
            return Ok(None);
        }
        let todo = build(todo);
        inner.todos.push(todo.clone());
        Ok(Some(todo))
    }

    async fn set_completed(&self, id: &str, completed: bool) -> ServerResult<Option<Todo>> {
        let mut inner = self.lock();
        Ok(inner.todos.iter_mut().find(|t| t.id == id).map(|t| {
            t.is_completed = completed;
            t.clone()
        }))
    }

    async fn delete(&self, id: &str) -> ServerResult<bool> {
        let mut inner = self.lock();
        let before = inner.todos.len();
        inner.todos.retain(|t| t.id != id);
        Ok(inner.todos.len() != before)
    }

    async fn find_unique(&self, id: &str) -> ServerResult<Option<Todo>> {
        Ok(self.lock().todos.iter().find(|t| t.id == id).cloned())
    }

    async fn find_incomplete(&self, window: &DayWindow) -> ServerResult<Vec<Todo>> {
        let inner = self.lock();
        Ok(sorted(
            inner
                .todos
                .iter()
                .filter(|t| !t.is_completed && in_window(t, window))
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn users_with_accounts(&self) -> ServerResult<Vec<UserRecord>> {
        let inner = self.lock();
        Ok(inner.users.iter().map(|u| Self::record(&inner, u)).collect())
    }

    async fn find_user(&self, user_id: &str) -> ServerResult<Option<UserRecord>> {
        let inner = self.lock();
        Ok(inner
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| Self::record(&inner, u)))
    }

    async fn upsert_google_login(&self, login: GoogleLogin) -> ServerResult<User> {
        let mut inner = self.lock();

        let existing = inner
            .accounts
            .iter()
            .find(|(_, a)| a.provider_account_id == login.sub)
            .map(|(user_id, _)| user_id.clone())
            .or_else(|| {
                inner
                    .users
                    .iter()
                    .find(|u| u.email == login.email)
                    .map(|u| u.id.clone())
            });

        let index = existing.and_then(|id| inner.users.iter().position(|u| u.id == id));
        let user = match index {
            Some(i) => {
                let user = &mut inner.users[i];
                user.email = login.email.clone();
                if login.name.is_some() {
                    user.name = login.name.clone();
                }
                user.clone()
            }
            None => {
                let user = User {
                    id: uuid::Uuid::new_v4().to_string(),
                    email: login.email.clone(),
                    name: login.name.clone(),
                };
                inner.users.push(user.clone());
                user
            }
        };

        let previous_refresh = inner
            .accounts
            .get(&user.id)
            .and_then(|a| a.token.refresh_token.clone());
        let previous_scope = inner.accounts.get(&user.id).and_then(|a| a.scope.clone());
        let mut token = login.token;
        token.refresh_token = token.refresh_token.or(previous_refresh);
        token.error = None;
        token.error_reason = None;

        inner.accounts.insert(
            user.id.clone(),
            GoogleAccount {
                provider_account_id: login.sub,
                token,
                scope: login.scope.or(previous_scope),
            },
        );
        Ok(user)
    }

    async fn save_token_state(&self, user_id: &str, token: &TokenState) -> ServerResult<()> {
        if let Some(account) = self.lock().accounts.get_mut(user_id) {
            account.token = token.clone();
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, user_id: &str, expires_at: DateTime<Utc>) -> ServerResult<Session> {
        let session = Session {
            token: generate_session_token(),
            user_id: user_id.to_string(),
            expires_at,
        };
        self.lock()
            .sessions
            .insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn find_session(&self, token: &str, now: DateTime<Utc>) -> ServerResult<Option<Session>> {
        Ok(self
            .lock()
            .sessions
            .get(token)
            .filter(|s| s.expires_at > now)
            .cloned())
    }

    async fn delete_session(&self, token: &str) -> ServerResult<bool> {
        Ok(self.lock().sessions.remove(token).is_some())
    }
}
