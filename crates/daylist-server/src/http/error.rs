//! Mapping of domain failures onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::ServerError;
use crate::store::OwnedError;

/// Where a client with expired calendar credentials should go.
pub const REAUTH_PATH: &str = "/api/auth/refresh";

/// Error answered by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No session, or the session is unknown or expired.
    #[error("Unauthorized")]
    Unauthenticated,

    /// The session is valid but its Google credentials are not.
    #[error("Unauthorized - Please login again")]
    TokenExpired { reason: Option<String> },

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    /// A Google call failed; answered with the failing operation and details.
    #[error("{error}: {details}")]
    Upstream { error: &'static str, details: String },

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn token_expired(reason: Option<String>) -> Self {
        Self::TokenExpired { reason }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::TokenExpired { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Unauthenticated => json!({"error": self.to_string(), "code": "unauthenticated"}),
            Self::TokenExpired { reason } => json!({
                "error": self.to_string(),
                "code": "token_expired",
                "reason": reason,
                "reauthUrl": REAUTH_PATH,
            }),
            Self::Forbidden | Self::NotFound(_) | Self::BadRequest(_) => json!({"error": self.to_string()}),
            Self::Upstream { error, details } => {
                error!(%error, %details, "upstream call failed");
                json!({"error": error, "details": details})
            }
            Self::Internal(message) => {
                error!(error = %message, "request failed");
                json!({"error": "Internal Server Error", "message": message})
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<OwnedError> for ApiError {
    fn from(err: OwnedError) -> Self {
        match err {
            OwnedError::NotFound => Self::not_found("Todo not found"),
            OwnedError::Forbidden => Self::Forbidden,
            OwnedError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn token_expired_carries_reason_and_reauth_url() {
        let (status, body) = body_of(ApiError::token_expired(Some("invalid_grant".into()))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "token_expired");
        assert_eq!(body["reason"], "invalid_grant");
        assert_eq!(body["reauthUrl"], REAUTH_PATH);
    }

    #[tokio::test]
    async fn owned_errors_map_to_404_and_403() {
        let (status, body) = body_of(OwnedError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Todo not found");

        let (status, body) = body_of(OwnedError::Forbidden.into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden");
    }

    #[tokio::test]
    async fn internal_errors_hide_behind_500() {
        let (status, body) = body_of(ServerError::config("boom").into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
    }
}
