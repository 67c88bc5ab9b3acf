//! HTTP API.
//!
//! | route                              | module       |
//! |------------------------------------|--------------|
//! | `/api/todos[/...]`                 | [`todos`]    |
//! | `/api/calendar/{list,events}`      | [`calendar`] |
//! | `/api/cron/*`                      | [`cron`]     |
//! | `/api/auth/*`                      | [`auth`]     |
//! | `/api/debug/session`               | [`debug`]    |

pub mod auth;
pub mod calendar;
pub mod cron;
pub mod debug;
pub mod error;
pub mod session;
pub mod todos;

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

pub use error::{ApiError, ApiResult};
pub use session::{AuthUser, CalendarSession, SESSION_COOKIE};

/// Builds the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .merge(todos::router())
        .merge(calendar::router())
        .merge(cron::router())
        .merge(auth::router())
        .merge(debug::router())
        .with_state(state)
}
