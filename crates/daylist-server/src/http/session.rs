//! Session extraction.
//!
//! A session token arrives either as the `daylist_session` cookie or as an
//! `Authorization: Bearer` header. [`AuthUser`] only resolves the user;
//! [`CalendarSession`] additionally materializes the user's Google token so
//! calendar handlers receive a usable access token or a 401 `token_expired`.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use chrono::Utc;
use tracing::{debug, warn};

use daylist_providers::TokenState;

use super::error::ApiError;
use crate::state::AppState;
use crate::store::User;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "daylist_session";

/// The signed-in user behind a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    /// The token the session was presented with.
    pub session_token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let token = session_token(&parts.headers).ok_or(ApiError::Unauthenticated)?;
        let session = app
            .sessions
            .find_session(token, Utc::now())
            .await?
            .ok_or(ApiError::Unauthenticated)?;
        Ok(Self {
            user_id: session.user_id,
            session_token: session.token,
        })
    }
}

/// A signed-in user with a Google access token valid right now.
#[derive(Debug, Clone)]
pub struct CalendarSession {
    pub user: User,
    pub access_token: String,
    pub token: TokenState,
}

impl<S> FromRequestParts<S> for CalendarSession
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        let app = AppState::from_ref(state);
        let now = Utc::now();

        let record = app
            .accounts
            .find_user(&auth.user_id)
            .await?
            .ok_or(ApiError::Unauthenticated)?;
        let Some(account) = record.account.filter(|a| !a.token.access_token.is_empty()) else {
            return Err(ApiError::token_expired(Some("no_google_account".into())));
        };

        let materialized = app.tokens.materialize(account.token, now).await;
        if materialized.outcome.changed() {
            app.accounts
                .save_token_state(&record.user.id, &materialized.state)
                .await?;
        }
        let token = materialized.state;

        if token.needs_reauth() {
            debug!(user_id = %record.user.id, reason = ?token.error_reason, "calendar session needs re-authentication");
            return Err(ApiError::token_expired(token.error_reason.clone()));
        }
        let Some(access_token) = token.usable_access_token(now).map(str::to_string) else {
            warn!(user_id = %record.user.id, "access token expired without refresh token");
            return Err(ApiError::token_expired(Some("expired".into())));
        };

        Ok(Self {
            user: record.user,
            access_token,
            token,
        })
    }
}

/// Session token from the cookie, else from a bearer header.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|header| parse_cookie(header, SESSION_COOKIE))
        .filter(|t| !t.is_empty());
    from_cookie.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    })
}

/// Parse a specific cookie value from a Cookie header string.
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(name)
            .and_then(|value| value.strip_prefix('='))
    })
}

/// `Set-Cookie` value starting a session.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

/// `Set-Cookie` value ending a session.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}
