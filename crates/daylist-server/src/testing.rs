//! Fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use daylist_core::{CalendarEvent, CalendarInfo, DayWindow, EventTime};
use daylist_providers::{
    BoxFuture, CalendarProvider, ProviderError, ProviderResult, RefreshError, TokenGrant,
    TokenRefresher, TokenState,
};

/// Calendar answering per access token and calendar id.
#[derive(Default)]
pub struct FakeCalendar {
    pub calendars: Vec<CalendarInfo>,
    /// Keyed by `(access_token, calendar_id)`.
    pub events: HashMap<(String, String), Vec<CalendarEvent>>,
    /// Access tokens answered with 401.
    pub rejected_tokens: Vec<String>,
    /// Calendars answered with a server error.
    pub failing_calendars: Vec<String>,
    pub calls: AtomicUsize,
}

impl FakeCalendar {
    pub fn with_events(mut self, token: &str, calendar: &str, events: Vec<CalendarEvent>) -> Self {
        self.events
            .insert((token.to_string(), calendar.to_string()), events);
        self
    }
}

impl CalendarProvider for FakeCalendar {
    fn name(&self) -> &str {
        "fake"
    }

    fn list_calendars<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, ProviderResult<Vec<CalendarInfo>>> {
        Box::pin(async move {
            if self.rejected_tokens.iter().any(|t| t == access_token) {
                return Err(ProviderError::authentication("token rejected"));
            }
            Ok(self.calendars.clone())
        })
    }

    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        _window: &'a DayWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.rejected_tokens.iter().any(|t| t == access_token) {
                return Err(ProviderError::authentication("token rejected"));
            }
            if self.failing_calendars.iter().any(|c| c == calendar_id) {
                return Err(ProviderError::server("backend unavailable"));
            }
            Ok(self
                .events
                .get(&(access_token.to_string(), calendar_id.to_string()))
                .cloned()
                .unwrap_or_default())
        })
    }
}

/// Refresher replaying canned responses.
#[derive(Default)]
pub struct FakeRefresher {
    responses: Mutex<VecDeque<Result<TokenGrant, RefreshError>>>,
    pub calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn new(responses: Vec<Result<TokenGrant, RefreshError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl TokenRefresher for FakeRefresher {
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

/// 2025-11-11 10:00 KST.
pub fn kst_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 11, 1, 0, 0).unwrap()
}

pub fn nov(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
}

pub fn timed(id: &str, summary: &str, start: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent::new(
        id,
        summary,
        EventTime::from_utc(start),
        EventTime::from_utc(start + Duration::minutes(30)),
        "primary",
    )
}

pub fn all_day(id: &str, summary: &str, start: NaiveDate, end: NaiveDate) -> CalendarEvent {
    CalendarEvent::new(id, summary, EventTime::from_date(start), EventTime::from_date(end), "primary")
}

/// Token valid for another hour at `now`.
pub fn fresh_token(access: &str, now: DateTime<Utc>) -> TokenState {
    TokenState {
        access_token: access.to_string(),
        refresh_token: Some(format!("{access}-refresh")),
        access_token_expires_at: (now + Duration::hours(1)).timestamp_millis(),
        error: None,
        error_reason: None,
    }
}

/// Token that expired a minute before `now`.
pub fn expired_token(access: &str, refresh: Option<&str>, now: DateTime<Utc>) -> TokenState {
    TokenState {
        access_token: access.to_string(),
        refresh_token: refresh.map(String::from),
        access_token_expires_at: (now - Duration::minutes(1)).timestamp_millis(),
        error: None,
        error_reason: None,
    }
}
