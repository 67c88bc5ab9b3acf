//! SQLite-backed store using sqlx.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use daylist_core::{DayWindow, NewTodo, Todo};
use daylist_providers::{TokenErrorTag, TokenState};

use super::{
    AccountStore, GoogleAccount, GoogleLogin, Session, SessionStore, TodoStore, User, UserRecord,
    generate_session_token, now_millis,
};
use crate::error::{ServerError, ServerResult};

const GOOGLE: &str = "google";

const TODO_COLUMNS: &str = "id, user_id, content, date, is_completed, created_at, source_event_id";

const USER_ACCOUNT_SELECT: &str = "SELECT u.id, u.email, u.name,
        a.provider_account_id, a.access_token, a.refresh_token, a.access_token_expires_at,
        a.token_error, a.token_error_reason, a.scope
     FROM users u
     LEFT JOIN accounts a ON a.user_id = u.id AND a.provider = 'google'";

/// Run the schema migrations on `pool`.
pub async fn run_migrations(pool: &SqlitePool) -> ServerResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// SQLite-backed persistence for todos, accounts and sessions.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to `database_url`, creating the file if needed, and runs
    /// migrations.
    ///
    /// In-memory URLs get a single connection that is never recycled, since
    /// every connection would otherwise see its own empty database.
    pub async fn connect(database_url: &str, max_connections: u32) -> ServerResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };

        run_migrations(&pool).await?;
        debug!(url = database_url, "database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn instant(ms: i64, column: &str) -> ServerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ServerError::corrupt(format!("{column} out of range: {ms}")))
}

fn todo_from_row(row: &SqliteRow) -> ServerResult<Todo> {
    Ok(Todo {
        id: row.get("id"),
        owner_user_id: row.get("user_id"),
        content: row.get("content"),
        date: instant(row.get("date"), "date")?,
        is_completed: row.get::<i64, _>("is_completed") != 0,
        created_at: instant(row.get("created_at"), "created_at")?,
        source_event_id: row.get("source_event_id"),
    })
}

fn record_from_row(row: &SqliteRow) -> UserRecord {
    let user = User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
    };
    let account = row
        .get::<Option<String>, _>("provider_account_id")
        .map(|provider_account_id| GoogleAccount {
            provider_account_id,
            token: TokenState {
                access_token: row.get("access_token"),
                refresh_token: row.get("refresh_token"),
                access_token_expires_at: row.get("access_token_expires_at"),
                error: row
                    .get::<Option<String>, _>("token_error")
                    .as_deref()
                    .and_then(TokenErrorTag::parse),
                error_reason: row.get("token_error_reason"),
            },
            scope: row.get("scope"),
        });
    UserRecord { user, account }
}

impl SqliteStore {
    async fn fetch_todo(&self, id: &str) -> ServerResult<Option<Todo>> {
        let row = sqlx::query(&format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(todo_from_row).transpose()
    }

    async fn insert_todo(&self, todo: NewTodo, ignore_duplicate: bool) -> ServerResult<Option<Todo>> {
        let created = Todo {
            id: uuid::Uuid::new_v4().to_string(),
            owner_user_id: todo.owner_user_id,
            content: todo.content,
            date: todo.date,
            is_completed: false,
            created_at: now_millis(),
            source_event_id: todo.source_event_id,
        };
        let conflict = if ignore_duplicate { " ON CONFLICT DO NOTHING" } else { "" };
        let result = sqlx::query(&format!(
            "INSERT INTO todos ({TODO_COLUMNS}) VALUES (?, ?, ?, ?, 0, ?, ?){conflict}"
        ))
        .bind(&created.id)
        .bind(&created.owner_user_id)
        .bind(&created.content)
        .bind(created.date.timestamp_millis())
        .bind(created.created_at.timestamp_millis())
        .bind(&created.source_event_id)
        .execute(&self.pool)
        .await?;

        Ok((result.rows_affected() > 0).then_some(created))
    }
}

#[async_trait]
impl TodoStore for SqliteStore {
    async fn find_many(&self, owner: &str, window: &DayWindow) -> ServerResult<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {TODO_COLUMNS} FROM todos
             WHERE user_id = ? AND date >= ? AND date < ?
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(owner)
        .bind(window.start.timestamp_millis())
        .bind(window.end.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(todo_from_row).collect()
    }

    async fn create(&self, todo: NewTodo) -> ServerResult<Todo> {
        self.insert_todo(todo, false)
            .await?
            .ok_or_else(|| ServerError::corrupt("insert reported no row"))
    }

    async fn create_from_event(&self, todo: NewTodo) -> ServerResult<Option<Todo>> {
        self.insert_todo(todo, true).await
    }

    async fn set_completed(&self, id: &str, completed: bool) -> ServerResult<Option<Todo>> {
        let result = sqlx::query("UPDATE todos SET is_completed = ? WHERE id = ?")
            .bind(i64::from(completed))
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_todo(id).await
    }

    async fn delete(&self, id: &str) -> ServerResult<bool> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_unique(&self, id: &str) -> ServerResult<Option<Todo>> {
        self.fetch_todo(id).await
    }

    async fn find_incomplete(&self, window: &DayWindow) -> ServerResult<Vec<Todo>> {
        let rows = sqlx::query(&format!(
            "SELECT {TODO_COLUMNS} FROM todos
             WHERE is_completed = 0 AND date >= ? AND date < ?
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(window.start.timestamp_millis())
        .bind(window.end.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(todo_from_row).collect()
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn users_with_accounts(&self) -> ServerResult<Vec<UserRecord>> {
        let rows = sqlx::query(&format!("{USER_ACCOUNT_SELECT} ORDER BY u.created_at ASC, u.id ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn find_user(&self, user_id: &str) -> ServerResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("{USER_ACCOUNT_SELECT} WHERE u.id = ?"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }

    async fn upsert_google_login(&self, login: GoogleLogin) -> ServerResult<User> {
        let mut tx = self.pool.begin().await?;

        let by_account: Option<String> = sqlx::query_scalar(
            "SELECT user_id FROM accounts WHERE provider = ? AND provider_account_id = ?",
        )
        .bind(GOOGLE)
        .bind(&login.sub)
        .fetch_optional(&mut *tx)
        .await?;
        let existing = match by_account {
            Some(id) => Some(id),
            None => {
                sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
                    .bind(&login.email)
                    .fetch_optional(&mut *tx)
                    .await?
            }
        };
        let user_id = existing.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        sqlx::query(
            "INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = COALESCE(excluded.name, users.name)",
        )
        .bind(&user_id)
        .bind(&login.email)
        .bind(&login.name)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO accounts (user_id, provider, provider_account_id, access_token, refresh_token,
                access_token_expires_at, token_error, token_error_reason, scope)
             VALUES (?, ?, ?, ?, ?, ?, NULL, NULL, ?)
             ON CONFLICT(user_id, provider) DO UPDATE SET
                provider_account_id = excluded.provider_account_id,
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, accounts.refresh_token),
                access_token_expires_at = excluded.access_token_expires_at,
                token_error = NULL,
                token_error_reason = NULL,
                scope = COALESCE(excluded.scope, accounts.scope)",
        )
        .bind(&user_id)
        .bind(GOOGLE)
        .bind(&login.sub)
        .bind(&login.token.access_token)
        .bind(&login.token.refresh_token)
        .bind(login.token.access_token_expires_at)
        .bind(&login.scope)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(User {
            id: user_id,
            email: login.email,
            name: login.name,
        })
    }

    async fn save_token_state(&self, user_id: &str, token: &TokenState) -> ServerResult<()> {
        sqlx::query(
            "UPDATE accounts SET
                access_token = ?, refresh_token = ?, access_token_expires_at = ?,
                token_error = ?, token_error_reason = ?
             WHERE user_id = ? AND provider = ?",
        )
        .bind(&token.access_token)
        .bind(&token.refresh_token)
        .bind(token.access_token_expires_at)
        .bind(token.error.map(|tag| tag.as_str()))
        .bind(&token.error_reason)
        .bind(user_id)
        .bind(GOOGLE)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(&self, user_id: &str, expires_at: DateTime<Utc>) -> ServerResult<Session> {
        let session = Session {
            token: generate_session_token(),
            user_id: user_id.to_string(),
            expires_at,
        };
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&session.token)
            .bind(&session.user_id)
            .bind(session.expires_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(session)
    }

    async fn find_session(&self, token: &str, now: DateTime<Utc>) -> ServerResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ? AND expires_at > ?",
        )
        .bind(token)
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(Session {
                token: row.get("token"),
                user_id: row.get("user_id"),
                expires_at: instant(row.get("expires_at"), "expires_at")?,
            })
        })
        .transpose()
    }

    async fn delete_session(&self, token: &str) -> ServerResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
