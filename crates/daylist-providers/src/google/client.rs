//! Google Calendar API client.
//!
//! A thin HTTP client over Calendar API v3. It holds no user credentials;
//! the bearer token is supplied per call.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use daylist_core::{CalendarEvent, CalendarInfo, DayWindow, EventTime};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, CalendarProvider};

use super::config::GoogleConfig;

/// Page size requested from events.list.
const PAGE_SIZE: usize = 250;

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::configuration("failed to create HTTP client").with_source(e))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.clone(),
        })
    }

    /// Lists events of `calendar_id` within `[time_min, time_max)`, following
    /// pagination.
    pub async fn fetch_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> ProviderResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .fetch_events_page(access_token, calendar_id, time_min, time_max, page_token.as_deref())
                .await?;

            events.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| convert_event(item, calendar_id)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(calendar_id, count = events.len(), "fetched events");
        Ok(events)
    }

    async fn fetch_events_page(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> ProviderResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        );

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(ProviderError::from_transport)?;
        let response = check_status(response).await?;

        response
            .json::<EventListResponse>()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("failed to parse response: {}", e)))
    }

    /// Lists the calendars on the user's calendar list.
    pub async fn fetch_calendars(&self, access_token: &str) -> ProviderResult<Vec<CalendarInfo>> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http_client.get(&url).bearer_auth(access_token);
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(ProviderError::from_transport)?;
            let response = check_status(response).await?;
            let list: CalendarListResponse = response.json().await.map_err(|e| {
                ProviderError::invalid_response(format!("failed to parse response: {}", e))
            })?;

            calendars.extend(list.items.into_iter().map(CalendarInfo::from));

            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(calendars)
    }
}

impl CalendarProvider for GoogleCalendarClient {
    fn name(&self) -> &str {
        "google"
    }

    fn list_calendars<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarInfo>>> {
        Box::pin(async move {
            self.fetch_calendars(access_token)
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }

    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        window: &'a DayWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(async move {
            self.fetch_events(access_token, calendar_id, window.start, window.end)
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }
}

/// Maps non-success statuses onto provider error codes.
async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        reqwest::StatusCode::UNAUTHORIZED => {
            Err(ProviderError::authentication("access token expired or invalid"))
        }
        reqwest::StatusCode::FORBIDDEN => {
            Err(ProviderError::authorization("access denied to calendar"))
        }
        reqwest::StatusCode::NOT_FOUND => Err(ProviderError::not_found("calendar not found")),
        reqwest::StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            Err(ProviderError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {} seconds", s))
                    .unwrap_or_default()
            )))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::server(format!("API error ({}): {}", status, body)))
        }
    }
}

fn parse_time(time: ApiEventTime, event_id: &str) -> Option<EventTime> {
    match (time.date_time, time.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(&dt)
            .map(EventTime::from_local)
            .map_err(|e| warn!(event_id, error = %e, "failed to parse event datetime"))
            .ok(),
        (None, Some(date)) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map(EventTime::from_date)
            .map_err(|e| warn!(event_id, error = %e, "failed to parse event date"))
            .ok(),
        (None, None) => {
            warn!(event_id, "event has neither date nor dateTime");
            None
        }
    }
}

/// Converts an API event, skipping cancelled and malformed ones.
fn convert_event(event: ApiEvent, calendar_id: &str) -> Option<CalendarEvent> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id?;
    let start = parse_time(event.start, &id)?;
    let end = parse_time(event.end, &id)?;

    let mut converted = CalendarEvent::new(id, event.summary.unwrap_or_default(), start, end, calendar_id);
    converted.description = event.description;
    converted.location = event.location;
    Some(converted)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: ApiEventTime,
    end: ApiEventTime,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
    /// User-set display name overriding `summary`.
    summary_override: Option<String>,
    description: Option<String>,
    #[serde(default)]
    primary: bool,
    access_role: Option<String>,
    background_color: Option<String>,
    foreground_color: Option<String>,
    #[serde(default)]
    selected: bool,
}

impl From<CalendarListEntry> for CalendarInfo {
    fn from(entry: CalendarListEntry) -> Self {
        CalendarInfo {
            summary: entry.summary_override.unwrap_or(entry.summary),
            id: entry.id,
            description: entry.description,
            primary: entry.primary,
            access_role: entry.access_role,
            background_color: entry.background_color,
            foreground_color: entry.foreground_color,
            selected: entry.selected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::google::config::OAuthCredentials;
    use chrono::TimeZone;
    use daylist_core::ReferenceZone;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> GoogleCalendarClient {
        let config = GoogleConfig::new(OAuthCredentials::new("c.apps.googleusercontent.com", "s"))
            .with_api_base(server.url());
        GoogleCalendarClient::new(&config).unwrap()
    }

    fn window() -> DayWindow {
        DayWindow::new(NaiveDate::from_ymd_opt(2025, 11, 11).unwrap(), &ReferenceZone::default())
    }

    #[test]
    fn converts_timed_and_all_day_events() {
        let json = r#"{
            "items": [
                {"id": "t", "summary": "Standup",
                 "start": {"dateTime": "2025-11-11T09:00:00+09:00"},
                 "end": {"dateTime": "2025-11-11T09:15:00+09:00"}},
                {"id": "a", "summary": "Holiday",
                 "start": {"date": "2025-11-11"}, "end": {"date": "2025-11-12"}},
                {"id": "c", "status": "cancelled",
                 "start": {"date": "2025-11-11"}, "end": {"date": "2025-11-12"}},
                {"id": "broken", "start": {}, "end": {}}
            ]
        }"#;

        let response: EventListResponse = serde_json::from_str(json).unwrap();
        let events: Vec<CalendarEvent> = response
            .items
            .into_iter()
            .filter_map(|e| convert_event(e, "primary"))
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].start,
            EventTime::from_utc(Utc.with_ymd_and_hms(2025, 11, 11, 0, 0, 0).unwrap())
        );
        assert!(events[1].is_all_day());
        assert_eq!(events[1].calendar_id, "primary");
    }

    #[test]
    fn calendar_entry_prefers_summary_override() {
        let entry: CalendarListEntry = serde_json::from_str(
            r##"{"id":"w","summary":"work@corp","summaryOverride":"Work","accessRole":"owner","backgroundColor":"#9fe1e7"}"##,
        )
        .unwrap();
        let info = CalendarInfo::from(entry);
        assert_eq!(info.summary, "Work");
        assert_eq!(info.access_role.as_deref(), Some("owner"));
        assert_eq!(info.background_color.as_deref(), Some("#9fe1e7"));
    }

    #[tokio::test]
    async fn list_events_queries_window_and_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/calendars/primary/events")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeMin".into(), "2025-11-10T15:00:00+00:00".into()),
                Matcher::UrlEncoded("timeMax".into(), "2025-11-11T15:00:00+00:00".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                Matcher::UrlEncoded("orderBy".into(), "startTime".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"items":[{"id":"1","summary":"One","start":{"date":"2025-11-11"},"end":{"date":"2025-11-12"}}],"nextPageToken":"p2"}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_status(200)
            .with_body(r#"{"items":[{"id":"2","summary":"Two","start":{"date":"2025-11-11"},"end":{"date":"2025-11-12"}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let window = window();
        let events = client.list_events("tok", "primary", &window).await.unwrap();

        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/me/calendarList")
            .with_status(401)
            .create_async()
            .await;

        let err = client_for(&server).list_calendars("stale").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthenticationFailed);
        assert_eq!(err.provider(), Some("google"));
    }

    #[tokio::test]
    async fn rate_limit_reports_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("Retry-After", "30")
            .create_async()
            .await;

        let window = window();
        let err = client_for(&server)
            .list_events("tok", "primary", &window)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::RateLimited);
        assert!(err.message().contains("30 seconds"));
    }

    #[tokio::test]
    async fn encodes_calendar_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/calendars/team%40group.calendar.google.com/events")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"items":[]}"#)
            .create_async()
            .await;

        let window = window();
        let events = client_for(&server)
            .list_events("tok", "team@group.calendar.google.com", &window)
            .await
            .unwrap();
        assert!(events.is_empty());
        mock.assert_async().await;
    }
}
