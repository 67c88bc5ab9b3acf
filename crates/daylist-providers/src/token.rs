//! OAuth token state and its refresh lifecycle.
//!
//! A [`TokenState`] travels with the user (persisted on the linked account
//! row). Every time a session is materialized for calendar access it goes
//! through [`SessionTokenManager::materialize`], which either hands it back
//! untouched, refreshes it once through a [`TokenRefresher`], or tags it with
//! [`TokenErrorTag::RefreshAccessTokenError`] so the caller can force a new
//! sign-in.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provider::BoxFuture;

/// Lifetime assumed when the identity provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Marker left on a token state whose refresh failed.
///
/// Only a fresh OAuth grant removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenErrorTag {
    RefreshAccessTokenError,
}

impl TokenErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshAccessTokenError => "RefreshAccessTokenError",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RefreshAccessTokenError" => Some(Self::RefreshAccessTokenError),
            _ => None,
        }
    }
}

impl fmt::Display for TokenErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access/refresh token pair for one user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Epoch milliseconds; the access token is invalid from this instant on.
    pub access_token_expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TokenErrorTag>,
    /// Provider error code of the failed refresh, e.g. `invalid_grant`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl TokenState {
    /// Whether the access token must not be used at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.access_token_expires_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.access_token_expires_at)
    }

    /// True once a refresh has failed; the user has to sign in again.
    pub fn needs_reauth(&self) -> bool {
        self.error.is_some()
    }

    /// The access token if it can be handed to a provider at `now`.
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.needs_reauth() || self.access_token.is_empty() || self.is_expired(now) {
            None
        } else {
            Some(&self.access_token)
        }
    }

    /// First 20 characters of the access token followed by `...`.
    pub fn access_token_preview(&self) -> String {
        let head: String = self.access_token.chars().take(20).collect();
        format!("{head}...")
    }
}

impl fmt::Debug for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenState")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token_expires_at", &self.access_token_expires_at)
            .field("error", &self.error)
            .field("error_reason", &self.error_reason)
            .finish()
    }
}

/// Tokens as issued by the identity provider, either on sign-in or on refresh.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            scope: None,
        }
    }

    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn with_expires_in(mut self, secs: i64) -> Self {
        self.expires_in = Some(secs);
        self
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Failure of a refresh-token exchange.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The token endpoint answered with a non-success status.
    #[error("token endpoint rejected refresh ({status}): {error}")]
    Rejected {
        status: u16,
        /// OAuth error code, e.g. `invalid_grant`.
        error: String,
        description: Option<String>,
    },
    #[error("token refresh request failed: {0}")]
    Network(String),
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// Short machine-readable reason stored on the token state.
    pub fn reason(&self) -> &str {
        match self {
            Self::Rejected { error, .. } => error,
            Self::Network(_) => "network_error",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }

    /// The refresh token itself is revoked or expired.
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::Rejected { error, .. } if error == "invalid_grant")
    }
}

/// Exchanges a refresh token for a new access token.
///
/// Implementations perform exactly one request and never retry.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<TokenGrant, RefreshError>>;
}

/// What [`SessionTokenManager::materialize`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeOutcome {
    /// Still valid, returned as is.
    Reused,
    /// Refreshed once, successfully.
    Refreshed,
    /// Refresh attempted and failed; the state now carries the error tag.
    RefreshFailed,
    /// Expired with no refresh token; carried forward unchanged.
    ExpiredWithoutRefresh,
    /// Already tagged by an earlier failure; left alone.
    AlreadyFailed,
}

impl MaterializeOutcome {
    /// Whether the state differs from the input and should be persisted.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Refreshed | Self::RefreshFailed)
    }
}

/// Result of one materialization.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub state: TokenState,
    pub outcome: MaterializeOutcome,
}

/// Decides between reusing, refreshing and failing a token state.
///
/// Holds no per-user state; everything lives in the [`TokenState`] passed in.
#[derive(Clone)]
pub struct SessionTokenManager {
    refresher: Arc<dyn TokenRefresher>,
}

impl fmt::Debug for SessionTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenManager").finish_non_exhaustive()
    }
}

impl SessionTokenManager {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { refresher }
    }

    /// Expiry of a grant; a missing or non-positive `expires_in` falls back
    /// to [`DEFAULT_TOKEN_LIFETIME_SECS`].
    fn expiry(&self, expires_in: Option<i64>, now: DateTime<Utc>) -> i64 {
        let secs = expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        (now + Duration::seconds(secs)).timestamp_millis()
    }

    /// Token state for a fresh sign-in. Clears any previous error tag.
    pub fn initial_grant(&self, grant: TokenGrant, now: DateTime<Utc>) -> TokenState {
        TokenState {
            access_token_expires_at: self.expiry(grant.expires_in, now),
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            error: None,
            error_reason: None,
        }
    }

    /// Makes `state` ready for use at `now`.
    ///
    /// Performs at most one refresh call and never fails: a failed refresh
    /// is reported through the error tag on the returned state.
    pub async fn materialize(&self, state: TokenState, now: DateTime<Utc>) -> Materialized {
        if state.needs_reauth() {
            debug!(reason = ?state.error_reason, "token state already failed, skipping refresh");
            return Materialized {
                state,
                outcome: MaterializeOutcome::AlreadyFailed,
            };
        }

        if !state.is_expired(now) {
            return Materialized {
                state,
                outcome: MaterializeOutcome::Reused,
            };
        }

        let Some(refresh_token) = state.refresh_token.clone() else {
            debug!("access token expired and no refresh token available");
            return Materialized {
                state,
                outcome: MaterializeOutcome::ExpiredWithoutRefresh,
            };
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(grant) => {
                let rotated = grant.refresh_token.is_some();
                let refreshed = TokenState {
                    access_token_expires_at: self.expiry(grant.expires_in, now),
                    access_token: grant.access_token,
                    refresh_token: grant.refresh_token.or(Some(refresh_token)),
                    error: None,
                    error_reason: None,
                };
                info!(rotated, "refreshed access token");
                Materialized {
                    state: refreshed,
                    outcome: MaterializeOutcome::Refreshed,
                }
            }
            Err(err) => {
                warn!(error = %err, invalid_grant = err.is_invalid_grant(), "access token refresh failed");
                let failed = TokenState {
                    error: Some(TokenErrorTag::RefreshAccessTokenError),
                    error_reason: Some(err.reason().to_string()),
                    ..state
                };
                Materialized {
                    state: failed,
                    outcome: MaterializeOutcome::RefreshFailed,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Refresher that replays canned responses and counts calls.
    pub(crate) struct ScriptedRefresher {
        responses: Mutex<VecDeque<Result<TokenGrant, RefreshError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedRefresher {
        pub(crate) fn new(responses: Vec<Result<TokenGrant, RefreshError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenRefresher for ScriptedRefresher {
        fn refresh<'a>(&'a self, _refresh_token: &'a str) -> BoxFuture<'a, Result<TokenGrant, RefreshError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(RefreshError::Network("no scripted response".into())))
            })
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_762_819_200, 0).unwrap()
    }

    fn state(expires_at: DateTime<Utc>, refresh: Option<&str>) -> TokenState {
        TokenState {
            access_token: "old-access".into(),
            refresh_token: refresh.map(String::from),
            access_token_expires_at: expires_at.timestamp_millis(),
            error: None,
            error_reason: None,
        }
    }

    fn manager(refresher: &Arc<ScriptedRefresher>) -> SessionTokenManager {
        SessionTokenManager::new(refresher.clone())
    }

    #[test]
    fn initial_grant_uses_provider_lifetime() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![]));
        let grant = TokenGrant::new("a").with_refresh_token("r").with_expires_in(1800);
        let state = manager(&refresher).initial_grant(grant, now());
        assert_eq!(state.access_token_expires_at, (now() + Duration::seconds(1800)).timestamp_millis());
        assert_eq!(state.refresh_token.as_deref(), Some("r"));
        assert!(state.error.is_none());
    }

    #[test]
    fn initial_grant_falls_back_to_one_hour() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![]));
        let state = manager(&refresher).initial_grant(TokenGrant::new("a"), now());
        assert_eq!(state.access_token_expires_at, (now() + Duration::hours(1)).timestamp_millis());
        assert!(state.refresh_token.is_none());

        let zero = manager(&refresher).initial_grant(TokenGrant::new("a").with_expires_in(0), now());
        assert_eq!(zero.access_token_expires_at, state.access_token_expires_at);
    }

    #[tokio::test]
    async fn valid_token_is_reused_without_refresh() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![]));
        let input = state(now() + Duration::minutes(10), Some("refresh"));

        let result = manager(&refresher).materialize(input.clone(), now()).await;

        assert_eq!(result.outcome, MaterializeOutcome::Reused);
        assert_eq!(result.state, input);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn expiry_instant_counts_as_expired() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Ok(TokenGrant::new("new").with_expires_in(3600))]));
        let input = state(now(), Some("refresh"));

        let result = manager(&refresher).materialize(input, now()).await;

        assert_eq!(result.outcome, MaterializeOutcome::Refreshed);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Ok(TokenGrant::new("new-access").with_expires_in(3599))]));
        let input = state(now() - Duration::minutes(5), Some("refresh"));

        let result = manager(&refresher).materialize(input, now()).await;

        assert_eq!(result.outcome, MaterializeOutcome::Refreshed);
        assert!(result.outcome.changed());
        assert_eq!(result.state.access_token, "new-access");
        assert!(result.state.access_token_expires_at > now().timestamp_millis());
        assert!(result.state.error.is_none());
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_without_rotation_keeps_prior_refresh_token() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Ok(TokenGrant::new("new-access"))]));
        let input = state(now() - Duration::seconds(1), Some("keep-me"));

        let result = manager(&refresher).materialize(input, now()).await;

        assert_eq!(result.state.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(result.state.access_token_expires_at, (now() + Duration::hours(1)).timestamp_millis());
    }

    #[tokio::test]
    async fn rotated_refresh_token_replaces_prior() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Ok(
            TokenGrant::new("new-access").with_refresh_token("rotated"),
        )]));
        let input = state(now() - Duration::seconds(1), Some("old"));

        let result = manager(&refresher).materialize(input, now()).await;

        assert_eq!(result.state.refresh_token.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn invalid_grant_tags_state_and_keeps_tokens() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Err(RefreshError::Rejected {
            status: 400,
            error: "invalid_grant".into(),
            description: Some("Token has been expired or revoked.".into()),
        })]));
        let input = state(now() - Duration::minutes(1), Some("revoked"));

        let result = manager(&refresher).materialize(input.clone(), now()).await;

        assert_eq!(result.outcome, MaterializeOutcome::RefreshFailed);
        assert_eq!(result.state.error, Some(TokenErrorTag::RefreshAccessTokenError));
        assert_eq!(result.state.error_reason.as_deref(), Some("invalid_grant"));
        assert_eq!(result.state.access_token, input.access_token);
        assert_eq!(result.state.refresh_token, input.refresh_token);
        assert!(result.state.usable_access_token(now()).is_none());
    }

    #[tokio::test]
    async fn network_failure_is_tagged_not_raised() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Err(RefreshError::Network("connection reset".into()))]));
        let input = state(now() - Duration::minutes(1), Some("refresh"));

        let result = manager(&refresher).materialize(input, now()).await;

        assert!(result.state.needs_reauth());
        assert_eq!(result.state.error_reason.as_deref(), Some("network_error"));
    }

    #[tokio::test]
    async fn expired_without_refresh_token_is_carried_forward() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![]));
        let input = state(now() - Duration::minutes(1), None);

        let result = manager(&refresher).materialize(input.clone(), now()).await;

        assert_eq!(result.outcome, MaterializeOutcome::ExpiredWithoutRefresh);
        assert_eq!(result.state, input);
        assert!(result.state.error.is_none());
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn error_tag_is_never_cleared_by_materialize() {
        let refresher = Arc::new(ScriptedRefresher::new(vec![Ok(TokenGrant::new("would-succeed"))]));
        let mut input = state(now() - Duration::minutes(1), Some("refresh"));
        input.error = Some(TokenErrorTag::RefreshAccessTokenError);

        let result = manager(&refresher).materialize(input, now()).await;

        assert_eq!(result.outcome, MaterializeOutcome::AlreadyFailed);
        assert!(result.state.needs_reauth());
        assert_eq!(refresher.calls(), 0);
    }

    #[test]
    fn serde_uses_camel_case_and_error_name() {
        let mut s = state(now(), Some("r"));
        s.error = Some(TokenErrorTag::RefreshAccessTokenError);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["accessTokenExpiresAt"], now().timestamp_millis());
        assert_eq!(json["error"], "RefreshAccessTokenError");
    }

    #[test]
    fn debug_redacts_tokens() {
        let s = state(now(), Some("super-secret-refresh"));
        let debug = format!("{s:?}");
        assert!(!debug.contains("old-access"));
        assert!(!debug.contains("super-secret-refresh"));
    }

    #[test]
    fn preview_truncates_to_twenty_chars() {
        let mut s = state(now(), None);
        s.access_token = "ya29.a0AfH6SMBx1234567890abcdef".into();
        assert_eq!(s.access_token_preview(), "ya29.a0AfH6SMBx12345...");
    }
}
