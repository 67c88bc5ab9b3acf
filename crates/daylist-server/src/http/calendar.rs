//! `/api/calendar` routes: calendar list and the merged events of one day.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use daylist_core::{CalendarEvent, CalendarInfo, EventTime};
use daylist_providers::{ProviderError, fetch_merged_events};

use super::error::{ApiError, ApiResult};
use super::session::CalendarSession;
use super::todos::day_param;
use crate::state::AppState;

const LIST_FAILED: &str = "Failed to fetch calendar list";
const EVENTS_FAILED: &str = "Failed to fetch calendar events";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/calendar/list", get(list_calendars))
        .route("/api/calendar/events", get(list_events))
}

/// Authentication failures mean the stored token is no good; everything
/// else is reported as a failed upstream call.
fn provider_failure(err: &ProviderError, operation: &'static str) -> ApiError {
    if err.is_authentication() {
        ApiError::token_expired(Some(err.code().as_str().to_string()))
    } else {
        ApiError::Upstream {
            error: operation,
            details: err.to_string(),
        }
    }
}

async fn list_calendars(session: CalendarSession, State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let calendars = state
        .calendar
        .list_calendars(&session.access_token)
        .await
        .map_err(|e| provider_failure(&e, LIST_FAILED))?;

    Ok(Json(json!({
        "success": true,
        "count": calendars.len(),
        "calendars": calendars,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsQuery {
    date: Option<String>,
    /// Comma-separated calendar ids; every listed calendar when absent.
    calendar_ids: Option<String>,
}

/// Event as answered to API clients: bare dates for all-day boundaries,
/// RFC 3339 instants otherwise.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventView {
    id: String,
    summary: String,
    description: Option<String>,
    location: Option<String>,
    start: String,
    end: String,
    is_all_day: bool,
    calendar_id: String,
    calendar_name: Option<String>,
    background_color: Option<String>,
    foreground_color: Option<String>,
}

fn boundary(time: &EventTime) -> String {
    match time {
        EventTime::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        EventTime::AllDay(date) => date.format("%Y-%m-%d").to_string(),
    }
}

impl From<CalendarEvent> for EventView {
    fn from(event: CalendarEvent) -> Self {
        Self {
            is_all_day: event.is_all_day(),
            start: boundary(&event.start),
            end: boundary(&event.end),
            id: event.id,
            summary: event.summary,
            description: event.description,
            location: event.location,
            calendar_id: event.calendar_id,
            calendar_name: event.calendar_name,
            background_color: event.background_color,
            foreground_color: event.foreground_color,
        }
    }
}

fn requested_ids(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    (!ids.is_empty()).then_some(ids)
}

async fn list_events(
    session: CalendarSession,
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Value>> {
    let resolver = state.resolver();
    let date = day_param(resolver, query.date.as_deref(), Utc::now())?;

    let calendars = match requested_ids(query.calendar_ids.as_deref()) {
        Some(ids) => ids.into_iter().map(|id| CalendarInfo::new(id.clone(), id)).collect(),
        None => state
            .calendar
            .list_calendars(&session.access_token)
            .await
            .map_err(|e| provider_failure(&e, EVENTS_FAILED))?,
    };

    let merged = fetch_merged_events(
        state.calendar.as_ref(),
        &session.access_token,
        &calendars,
        resolver,
        date,
    )
    .await;

    if let Some(err) = merged.authentication_failure() {
        return Err(provider_failure(err, EVENTS_FAILED));
    }
    if merged.all_failed()
        && let Some(failure) = merged.failures.first()
    {
        return Err(provider_failure(&failure.error, EVENTS_FAILED));
    }

    let failed: Vec<&str> = merged.failures.iter().map(|f| f.calendar_id.as_str()).collect();
    debug!(
        user_id = %session.user.id,
        %date,
        calendars = merged.queried,
        failed = failed.len(),
        events = merged.events.len(),
        "merged calendar events"
    );

    let events: Vec<EventView> = merged.events.into_iter().map(EventView::from).collect();
    Ok(Json(json!({
        "success": true,
        "count": events.len(),
        "date": date.format("%Y-%m-%d").to_string(),
        "events": events,
        "failedCalendars": failed,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn calendar_ids_are_split_and_trimmed() {
        assert_eq!(
            requested_ids(Some("primary, team@example.com,,")),
            Some(vec!["primary".to_string(), "team@example.com".to_string()])
        );
        assert_eq!(requested_ids(Some(" , ")), None);
        assert_eq!(requested_ids(None), None);
    }

    #[test]
    fn all_day_boundaries_stay_dates() {
        let start = NaiveDate::from_ymd_opt(2025, 11, 11).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 11, 12).unwrap();
        let event = CalendarEvent::new("e1", "Holiday", EventTime::from_date(start), EventTime::from_date(end), "primary");

        let view = EventView::from(event);

        assert!(view.is_all_day);
        assert_eq!(view.start, "2025-11-11");
        assert_eq!(view.end, "2025-11-12");
    }

    #[test]
    fn timed_boundaries_are_rfc3339() {
        let at = Utc.with_ymd_and_hms(2025, 11, 11, 1, 0, 0).unwrap();
        let event = CalendarEvent::new("e1", "Standup", EventTime::from_utc(at), EventTime::from_utc(at), "primary");
        assert_eq!(EventView::from(event).start, "2025-11-11T01:00:00Z");
    }

    #[test]
    fn authentication_failures_become_token_expired() {
        let err = provider_failure(&ProviderError::authentication("401"), EVENTS_FAILED);
        assert!(matches!(err, ApiError::TokenExpired { .. }));

        let err = provider_failure(&ProviderError::server("503"), LIST_FAILED);
        assert!(matches!(err, ApiError::Upstream { error: LIST_FAILED, .. }));
    }
}
