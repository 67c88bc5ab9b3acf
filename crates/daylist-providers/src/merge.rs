//! Multi-calendar fetch with a partial-result policy.
//!
//! Each calendar is queried concurrently. A calendar whose fetch fails
//! contributes nothing and is reported in [`MergedEvents::failures`]; the
//! merge itself never fails. The joined list is filtered to the target day
//! and stable-sorted by start, so the output order does not depend on which
//! fetch finished first.

use chrono::NaiveDate;
use futures_util::future::join_all;
use tracing::{debug, warn};

use daylist_core::{CalendarEvent, CalendarInfo, CalendarWindowResolver};

use crate::error::ProviderError;
use crate::provider::CalendarProvider;

/// One calendar whose fetch failed.
#[derive(Debug)]
pub struct CalendarFailure {
    pub calendar_id: String,
    pub error: ProviderError,
}

/// Outcome of a merged fetch.
#[derive(Debug, Default)]
pub struct MergedEvents {
    /// Events of the target day across all calendars that answered.
    pub events: Vec<CalendarEvent>,
    pub failures: Vec<CalendarFailure>,
    /// Number of calendars queried.
    pub queried: usize,
}

impl MergedEvents {
    /// True when calendars were queried and none of them answered.
    pub fn all_failed(&self) -> bool {
        self.queried > 0 && self.failures.len() == self.queried
    }

    /// First failure that calls for re-authentication, if any.
    pub fn authentication_failure(&self) -> Option<&ProviderError> {
        self.failures
            .iter()
            .map(|f| &f.error)
            .find(|e| e.is_authentication())
    }
}

/// Fetches `calendars` for `date` and merges the results.
pub async fn fetch_merged_events(
    provider: &dyn CalendarProvider,
    access_token: &str,
    calendars: &[CalendarInfo],
    resolver: &CalendarWindowResolver,
    date: NaiveDate,
) -> MergedEvents {
    let window = resolver.window_for(date);

    let fetches = calendars
        .iter()
        .map(|calendar| provider.list_events(access_token, &calendar.id, &window));
    let results = join_all(fetches).await;

    let mut merged = MergedEvents {
        queried: calendars.len(),
        ..MergedEvents::default()
    };
    let mut collected = Vec::new();

    for (calendar, result) in calendars.iter().zip(results) {
        match result {
            Ok(events) => {
                debug!(calendar_id = %calendar.id, count = events.len(), "calendar fetched");
                collected.extend(events.into_iter().map(|mut event| {
                    event.decorate(calendar);
                    event
                }));
            }
            Err(error) => {
                warn!(calendar_id = %calendar.id, error = %error, "calendar fetch failed, skipping");
                merged.failures.push(CalendarFailure {
                    calendar_id: calendar.id.clone(),
                    error,
                });
            }
        }
    }

    merged.events = resolver.filter_and_sort(date, collected);
    merged
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use daylist_core::{DayWindow, EventTime};

    use crate::error::ProviderResult;
    use crate::provider::BoxFuture;

    /// Calendar provider answering from fixed per-calendar results.
    #[derive(Default)]
    pub(crate) struct FakeProvider {
        pub(crate) calendars: Vec<CalendarInfo>,
        pub(crate) events: HashMap<String, Vec<CalendarEvent>>,
        pub(crate) failing: Vec<String>,
        pub(crate) delays: HashMap<String, Duration>,
    }

    impl CalendarProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn list_calendars<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, ProviderResult<Vec<CalendarInfo>>> {
            Box::pin(async move { Ok(self.calendars.clone()) })
        }

        fn list_events<'a>(
            &'a self,
            _token: &'a str,
            calendar_id: &'a str,
            _window: &'a DayWindow,
        ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>> {
            Box::pin(async move {
                if let Some(delay) = self.delays.get(calendar_id) {
                    tokio::time::sleep(*delay).await;
                }
                if self.failing.iter().any(|id| id == calendar_id) {
                    return Err(ProviderError::server("backend unavailable"));
                }
                Ok(self.events.get(calendar_id).cloned().unwrap_or_default())
            })
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 11, h, m, 0).unwrap()
    }

    fn timed(id: &str, start: DateTime<Utc>, calendar: &str) -> CalendarEvent {
        CalendarEvent::new(
            id,
            id,
            EventTime::from_utc(start),
            EventTime::from_utc(start + chrono::Duration::minutes(30)),
            calendar,
        )
    }

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 11).unwrap()
    }

    #[tokio::test]
    async fn failing_calendar_contributes_nothing() {
        let calendars = vec![
            CalendarInfo::new("one", "One").with_colors("#111111", "#ffffff"),
            CalendarInfo::new("two", "Two"),
            CalendarInfo::new("three", "Three"),
        ];
        let mut provider = FakeProvider {
            failing: vec!["two".into()],
            ..FakeProvider::default()
        };
        provider.events.insert("one".into(), vec![timed("b", at(3, 0), "one"), timed("a", at(1, 0), "one")]);
        provider.events.insert("two".into(), vec![timed("never", at(0, 0), "two")]);
        provider.events.insert("three".into(), vec![timed("c", at(2, 0), "three")]);

        let merged = fetch_merged_events(&provider, "tok", &calendars, &CalendarWindowResolver::default(), target()).await;

        let ids: Vec<&str> = merged.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
        assert_eq!(merged.failures.len(), 1);
        assert_eq!(merged.failures[0].calendar_id, "two");
        assert!(!merged.all_failed());
        assert!(merged.authentication_failure().is_none());
        assert_eq!(merged.events[0].calendar_name.as_deref(), Some("One"));
        assert_eq!(merged.events[0].background_color.as_deref(), Some("#111111"));
    }

    #[tokio::test(start_paused = true)]
    async fn order_is_independent_of_completion_order() {
        let calendars = vec![CalendarInfo::new("slow", "Slow"), CalendarInfo::new("fast", "Fast")];
        let mut provider = FakeProvider::default();
        provider.delays.insert("slow".into(), Duration::from_secs(5));
        provider.events.insert("slow".into(), vec![timed("slow-tie", at(1, 0), "slow")]);
        provider.events.insert("fast".into(), vec![timed("fast-tie", at(1, 0), "fast")]);

        let merged = fetch_merged_events(&provider, "tok", &calendars, &CalendarWindowResolver::default(), target()).await;

        let ids: Vec<&str> = merged.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["slow-tie", "fast-tie"]);
    }

    #[tokio::test]
    async fn all_failed_is_reported() {
        let calendars = vec![CalendarInfo::new("one", "One")];
        let provider = FakeProvider {
            failing: vec!["one".into()],
            ..FakeProvider::default()
        };

        let merged = fetch_merged_events(&provider, "tok", &calendars, &CalendarWindowResolver::default(), target()).await;

        assert!(merged.events.is_empty());
        assert!(merged.all_failed());
    }

    #[tokio::test]
    async fn no_calendars_is_not_a_failure() {
        let provider = FakeProvider::default();
        let merged = fetch_merged_events(&provider, "tok", &[], &CalendarWindowResolver::default(), target()).await;
        assert!(merged.events.is_empty());
        assert!(!merged.all_failed());
    }
}
