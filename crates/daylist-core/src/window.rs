//! Maps calendar events onto a single day bucket.
//!
//! All-day events come from providers with an exclusive end date, so an
//! event on 2025-11-11 alone reads `start = 2025-11-11, end = 2025-11-12`.
//! It belongs to target date `D` iff `end > D`. Timed events are fetched with
//! the day's instant window and always kept.

use chrono::{DateTime, NaiveDate, Utc};

use crate::event::CalendarEvent;
use crate::time::{DayWindow, EventTime, ReferenceZone};

/// Computes query windows and filters/sorts events for a target date.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarWindowResolver {
    zone: ReferenceZone,
}

impl CalendarWindowResolver {
    pub fn new(zone: ReferenceZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &ReferenceZone {
        &self.zone
    }

    /// Half-open UTC range to query the provider with for `date`.
    pub fn window_for(&self, date: NaiveDate) -> DayWindow {
        DayWindow::new(date, &self.zone)
    }

    /// Window for "today" in the reference zone.
    pub fn today(&self, now: DateTime<Utc>) -> DayWindow {
        self.window_for(self.zone.today(now))
    }

    /// Whether `event` belongs to `date`.
    pub fn includes(&self, date: NaiveDate, event: &CalendarEvent) -> bool {
        match (&event.start, &event.end) {
            (EventTime::AllDay(_), EventTime::AllDay(end)) => *end > date,
            // malformed mix: fall back to the start date
            (EventTime::AllDay(start), EventTime::DateTime(_)) => *start == date,
            (EventTime::DateTime(_), _) => true,
        }
    }

    /// Sort key: instants as-is, all-day dates at local midnight.
    pub fn sort_key(&self, time: &EventTime) -> DateTime<Utc> {
        time.to_instant(&self.zone)
    }

    /// Drops events not belonging to `date` and sorts the rest by start.
    ///
    /// The sort is stable, so events sharing a start keep their input order.
    pub fn filter_and_sort(&self, date: NaiveDate, events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
        let mut kept: Vec<CalendarEvent> = events
            .into_iter()
            .filter(|event| self.includes(date, event))
            .collect();
        kept.sort_by_key(|event| self.sort_key(&event.start));
        kept
    }

    /// Midnight of `date` as stored on todos.
    pub fn bucket_instant(&self, date: NaiveDate) -> DateTime<Utc> {
        self.zone.midnight(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn all_day(id: &str, start: NaiveDate, end: NaiveDate) -> CalendarEvent {
        CalendarEvent::new(id, id, EventTime::from_date(start), EventTime::from_date(end), "primary")
    }

    fn timed(id: &str, start: DateTime<Utc>, calendar: &str) -> CalendarEvent {
        CalendarEvent::new(
            id,
            id,
            EventTime::from_utc(start),
            EventTime::from_utc(start + chrono::Duration::hours(1)),
            calendar,
        )
    }

    #[test]
    fn single_day_all_day_event_is_end_exclusive() {
        let resolver = CalendarWindowResolver::default();
        let event = all_day("holiday", date(2025, 11, 11), date(2025, 11, 12));
        assert!(resolver.includes(date(2025, 11, 11), &event));
        assert!(!resolver.includes(date(2025, 11, 12), &event));
    }

    #[test]
    fn multi_day_all_day_event_covers_each_day() {
        let resolver = CalendarWindowResolver::default();
        let event = all_day("trip", date(2025, 11, 10), date(2025, 11, 13));
        assert!(resolver.includes(date(2025, 11, 10), &event));
        assert!(resolver.includes(date(2025, 11, 12), &event));
        assert!(!resolver.includes(date(2025, 11, 13), &event));
    }

    #[test]
    fn timed_events_always_included() {
        let resolver = CalendarWindowResolver::default();
        let event = timed("standup", utc(2025, 11, 11, 0, 0), "primary");
        assert!(resolver.includes(date(2025, 11, 11), &event));
    }

    #[test]
    fn window_is_kst_day() {
        let resolver = CalendarWindowResolver::default();
        let window = resolver.window_for(date(2025, 11, 11));
        assert_eq!(window.start, utc(2025, 11, 10, 15, 0));
        assert_eq!(window.end, utc(2025, 11, 11, 15, 0));
    }

    #[test]
    fn today_follows_reference_zone() {
        let resolver = CalendarWindowResolver::default();
        // 16:00 UTC is already the next day in Seoul
        assert_eq!(resolver.today(utc(2025, 11, 10, 16, 0)).date, date(2025, 11, 11));
    }

    #[test]
    fn filter_and_sort_orders_all_day_at_local_midnight() {
        let resolver = CalendarWindowResolver::default();
        let target = date(2025, 11, 11);
        let events = vec![
            timed("late", utc(2025, 11, 11, 5, 0), "a"),
            all_day("stale", date(2025, 11, 10), date(2025, 11, 11)),
            timed("early", utc(2025, 11, 10, 23, 0), "a"),
            all_day("holiday", date(2025, 11, 11), date(2025, 11, 12)),
        ];

        let ids: Vec<String> = resolver
            .filter_and_sort(target, events)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["holiday", "early", "late"]);
    }

    #[test]
    fn ties_keep_input_order() {
        let resolver = CalendarWindowResolver::default();
        let at = utc(2025, 11, 11, 1, 0);
        let events = vec![timed("b", at, "cal-2"), timed("a", at, "cal-1"), timed("c", at, "cal-3")];
        let ids: Vec<String> = resolver
            .filter_and_sort(date(2025, 11, 11), events)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn bucket_instant_is_local_midnight() {
        let resolver = CalendarWindowResolver::default();
        assert_eq!(resolver.bucket_instant(date(2025, 1, 1)), utc(2024, 12, 31, 15, 0));
    }
}
