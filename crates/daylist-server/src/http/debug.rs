//! Session inspection for troubleshooting sign-in problems.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::SecondsFormat;
use serde_json::{Value, json};

use super::error::{ApiError, ApiResult};
use super::session::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/debug/session", get(session))
}

/// Describes the caller's session without exposing the token itself.
async fn session(auth: AuthUser, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let record = state
        .accounts
        .find_user(&auth.user_id)
        .await?
        .ok_or(ApiError::Unauthenticated)?;
    let token = record
        .account
        .as_ref()
        .map(|a| &a.token)
        .filter(|t| !t.access_token.is_empty());

    Ok(Json(json!({
        "hasSession": true,
        "userId": record.user.id,
        "email": record.user.email,
        "name": record.user.name,
        "hasAccessToken": token.is_some(),
        "accessTokenPreview": token.map(|t| t.access_token_preview()),
        "expiresAt": token
            .and_then(|t| t.expires_at())
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        "error": token.and_then(|t| t.error).map(|e| e.as_str()),
    })))
}
