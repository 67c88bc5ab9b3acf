//! `/api/cron` routes, the HTTP triggers of the two daily jobs.
//!
//! When a cron secret is configured the caller must present it as
//! `Authorization: Bearer <secret>`.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::error::{ApiError, ApiResult};
use super::todos::day_param;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/cron/create-todos", get(create_todos))
        .route("/api/cron/send-notifications", get(send_notifications))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if state.cron_authorized(presented) {
        Ok(())
    } else {
        warn!("cron trigger rejected: bad or missing secret");
        Err(ApiError::Unauthenticated)
    }
}

#[derive(Debug, Deserialize)]
struct CronQuery {
    /// Run for this day instead of today.
    date: Option<String>,
}

async fn create_todos(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CronQuery>,
) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;
    let now = Utc::now();
    let date = day_param(state.resolver(), query.date.as_deref(), now)?;

    let report = state.sync.run_for(date, now).await?;
    Ok(Json(json!({
        "success": true,
        "date": report.date.format("%Y-%m-%d").to_string(),
        "processedUsers": report.processed_users,
        "results": report.results,
    })))
}

async fn send_notifications(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    authorize(&state, &headers)?;

    let report = state.reminder.run(Utc::now()).await?;
    Ok(Json(json!({
        "success": true,
        "notificationsSent": report.notifications_sent,
        "totalIncompleteTodos": report.total_incomplete_todos,
        "results": report.results,
    })))
}
