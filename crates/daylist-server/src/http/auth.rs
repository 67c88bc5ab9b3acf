//! `/api/auth` routes: Google sign-in with PKCE, re-login redirect, sign-out.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use daylist_providers::PkceFlow;

use super::error::{ApiError, ApiResult};
use super::session::{AuthUser, clear_session_cookie, session_cookie};
use crate::state::AppState;
use crate::store::GoogleLogin;

/// Where the browser lands after signing in.
pub const AFTER_LOGIN_PATH: &str = "/dashboard";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signin", get(signin))
        .route("/api/auth/callback/google", get(callback))
        .route("/api/auth/refresh", get(refresh))
        .route("/api/auth/signout", post(signout))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Starts a sign-in: remembers the PKCE verifier and sends the browser to
/// Google's consent page.
async fn signin(State(state): State<AppState>) -> Response {
    let flow = PkceFlow::new();
    let url = state.oauth.authorization_url(&flow, &state.settings.redirect_uri);
    state.start_login(flow.state, flow.verifier, Utc::now());
    found(&url)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> ApiResult<Response> {
    if let Some(error) = query.error {
        warn!(%error, "Google sign-in was not completed");
        return Err(ApiError::bad_request(format!("Google sign-in failed: {error}")));
    }
    let (Some(code), Some(csrf)) = (query.code, query.state) else {
        return Err(ApiError::bad_request("code and state are required"));
    };

    let now = Utc::now();
    let pending = state
        .finish_login(&csrf, now)
        .ok_or_else(|| ApiError::bad_request("Invalid or expired sign-in state"))?;

    let sign_in_failed = |e: daylist_providers::ProviderError| ApiError::Upstream {
        error: "Failed to complete sign-in",
        details: e.to_string(),
    };
    let grant = state
        .oauth
        .exchange_code(&code, &pending.verifier, &state.settings.redirect_uri)
        .await
        .map_err(sign_in_failed)?;
    let identity = state
        .oauth
        .fetch_userinfo(&grant.access_token)
        .await
        .map_err(sign_in_failed)?;
    let email = identity
        .email
        .ok_or_else(|| ApiError::bad_request("Google account has no email address"))?;

    let scope = grant.scope.clone();
    let login = GoogleLogin {
        sub: identity.sub,
        email,
        name: identity.name,
        token: state.tokens.initial_grant(grant, now),
        scope,
    };
    let user = state.accounts.upsert_google_login(login).await?;

    let ttl = state.settings.session_ttl;
    let session = state.sessions.create_session(&user.id, now + ttl).await?;
    info!(user_id = %user.id, "user signed in");

    let location = format!("{}{AFTER_LOGIN_PATH}", state.settings.base_url);
    Ok((
        StatusCode::FOUND,
        [
            (LOCATION, location),
            (SET_COOKIE, session_cookie(&session.token, ttl.num_seconds())),
        ],
    )
        .into_response())
}

/// Sends the browser back through sign-in after a failed token refresh.
async fn refresh(State(state): State<AppState>) -> Response {
    found(&format!(
        "{}/auth/signin?callbackUrl={AFTER_LOGIN_PATH}&reauth=true",
        state.settings.base_url
    ))
}

async fn signout(auth: AuthUser, State(state): State<AppState>) -> ApiResult<Response> {
    state.sessions.delete_session(&auth.session_token).await?;
    info!(user_id = %auth.user_id, "user signed out");
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie())],
        Json(json!({"success": true})),
    )
        .into_response())
}
