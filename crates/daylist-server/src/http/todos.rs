//! `/api/todos` routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use daylist_core::{CalendarWindowResolver, NewTodo, Todo, add_days, parse_date};

use super::error::{ApiError, ApiResult};
use super::session::AuthUser;
use crate::state::AppState;
use crate::store::{carry_over, delete_owned, update_owned};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/todos", get(list_todos).post(create_todo))
        .route("/api/todos/carry-over", post(carry_over_todos))
        .route("/api/todos/{id}", patch(update_todo).delete(delete_todo))
}

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

/// Resolves an optional `YYYY-MM-DD` (or RFC 3339) value to a day, defaulting
/// to today in the reference zone.
pub(crate) fn day_param(
    resolver: &CalendarWindowResolver,
    raw: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<NaiveDate> {
    let zone = resolver.zone();
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(zone.today(now)),
        Some(s) => parse_date(s)
            .or_else(|e| {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| zone.date_of(dt.with_timezone(&Utc)))
                    .map_err(|_| e)
            })
            .map_err(|e| ApiError::bad_request(format!("Invalid date: {e}"))),
    }
}

/// The optional `date` member of a JSON body; present values must be strings.
fn date_field(body: &Value) -> ApiResult<Option<&str>> {
    match body.get("date") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Ok(Some(raw)),
        Some(_) => Err(ApiError::bad_request("Invalid date")),
    }
}

async fn list_todos(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Vec<Todo>>> {
    let date = day_param(state.resolver(), query.date.as_deref(), Utc::now())?;
    let window = state.resolver().window_for(date);
    let todos = state.todos.find_many(&auth.user_id, &window).await?;
    Ok(Json(todos))
}

async fn create_todo(
    auth: AuthUser,
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let content = body
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Content is required"))?;
    let date = day_param(state.resolver(), date_field(&body)?, Utc::now())?;

    let todo = state
        .todos
        .create(NewTodo::new(
            auth.user_id.clone(),
            content,
            state.resolver().bucket_instant(date),
        ))
        .await?;
    info!(user_id = %auth.user_id, todo_id = %todo.id, %date, "todo created");
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Todo>> {
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let completed = body
        .get("isCompleted")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::bad_request("isCompleted must be a boolean"))?;

    let todo = update_owned(state.todos.as_ref(), &auth.user_id, &id, completed).await?;
    Ok(Json(todo))
}

async fn delete_todo(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    delete_owned(state.todos.as_ref(), &auth.user_id, &id).await?;
    info!(user_id = %auth.user_id, todo_id = %id, "todo deleted");
    Ok(Json(json!({"message": "Todo deleted successfully"})))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CarryOverRequest {
    from_date: Option<String>,
    to_date: Option<String>,
    ids: Option<Vec<String>>,
}

async fn carry_over_todos(
    auth: AuthUser,
    State(state): State<AppState>,
    body: Result<Option<Json<CarryOverRequest>>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = body
        .map_err(|e| ApiError::bad_request(e.body_text()))?
        .map(|Json(b)| b)
        .unwrap_or_default();
    let now = Utc::now();

    let to = day_param(state.resolver(), request.to_date.as_deref(), now)?;
    let from = match request.from_date.as_deref() {
        Some(raw) => day_param(state.resolver(), Some(raw), now)?,
        None => add_days(to, -1),
    };
    if from == to {
        return Err(ApiError::bad_request("fromDate and toDate must differ"));
    }

    let resolver = state.resolver();
    let created = carry_over(
        state.todos.as_ref(),
        &auth.user_id,
        &resolver.window_for(from),
        resolver.bucket_instant(to),
        request.ids.as_deref(),
    )
    .await?;

    info!(user_id = %auth.user_id, %from, %to, created = created.len(), "todos carried over");
    Ok((
        StatusCode::CREATED,
        Json(json!({"created": created.len(), "todos": created})),
    ))
}
