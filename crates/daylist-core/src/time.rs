//! Time types for calendar events and todo buckets.
//!
//! This module provides [`EventTime`] for event start/end values (either an
//! instant or a bare all-day date), [`ReferenceZone`] for the deployment
//! timezone that decides which day a todo belongs to, and [`DayWindow`] for
//! the half-open UTC range covering one day in that zone.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default reference timezone (KST).
pub const DEFAULT_ZONE: Tz = chrono_tz::Asia::Seoul;

/// Minutes probed past a skipped midnight, in quarter-hour steps.
const MIDNIGHT_GAP_STEP_MINUTES: i64 = 15;
const MIDNIGHT_GAP_STEPS: i64 = 8;

/// Represents the start or end of a calendar event.
///
/// - **DateTime**: a specific instant, stored as UTC
/// - **AllDay**: a date without time of day; for an end value the date is
///   exclusive, one day past the last covered day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day date.
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a new `EventTime::DateTime` from a datetime in any timezone.
    pub fn from_local<Z: TimeZone>(dt: DateTime<Z>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day value.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the instant if this is a `DateTime` variant.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Returns the date if this is an `AllDay` variant.
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Self::AllDay(d) => Some(d),
            Self::DateTime(_) => None,
        }
    }

    /// Converts to an instant, placing all-day dates at local midnight in
    /// `zone`.
    pub fn to_instant(&self, zone: &ReferenceZone) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => zone.midnight(*date),
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by instant, with all-day dates at midnight in the default zone.
impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        let zone = ReferenceZone::default();
        self.to_instant(&zone).cmp(&other.to_instant(&zone))
    }
}

/// Error returned when a timezone name or date string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    /// Not an IANA timezone name.
    #[error("unknown timezone: {0}")]
    UnknownZone(String),
    /// Not a `YYYY-MM-DD` date.
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// The deployment's reference timezone.
///
/// Todos are bucketed by calendar day in this zone and the daily jobs fire on
/// its wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone {
    tz: Tz,
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self { tz: DEFAULT_ZONE }
    }
}

impl ReferenceZone {
    /// Creates a reference zone from a chrono-tz timezone.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Returns the underlying timezone.
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Returns the IANA name of the zone.
    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    /// Local midnight of `date` as a UTC instant.
    ///
    /// A midnight skipped by a DST transition resolves to the first local
    /// time of the date that exists, e.g. 01:00 when clocks jump from 00:00.
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date.and_time(NaiveTime::MIN);
        (0..=MIDNIGHT_GAP_STEPS)
            .map(|step| naive + Duration::minutes(step * MIDNIGHT_GAP_STEP_MINUTES))
            .find_map(|candidate| self.tz.from_local_datetime(&candidate).earliest())
            .map(|local| local.with_timezone(&Utc))
            // unreachable for real zones
            .unwrap_or_else(|| self.tz.from_utc_datetime(&naive).with_timezone(&Utc))
    }

    /// Calendar date of `instant` in this zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Today's date in this zone.
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.date_of(now)
    }

    /// Formats `instant` as `YYYY-MM-DD` in this zone.
    pub fn date_string(&self, instant: DateTime<Utc>) -> String {
        self.date_of(instant).format("%Y-%m-%d").to_string()
    }
}

impl FromStr for ReferenceZone {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Tz>()
            .map(Self::new)
            .map_err(|_| TimeParseError::UnknownZone(s.to_string()))
    }
}

impl fmt::Display for ReferenceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate, TimeParseError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| TimeParseError::InvalidDate(s.to_string()))
}

/// Adds `days` (possibly negative) to `date`, saturating at the calendar
/// bounds.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX })
}

/// One day in the reference zone as a half-open UTC range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    /// The calendar day this window covers.
    pub date: NaiveDate,
    /// Local midnight of `date` (inclusive).
    pub start: DateTime<Utc>,
    /// Exactly 24 hours after `start` (exclusive).
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// Builds the window for `date` in `zone`.
    pub fn new(date: NaiveDate, zone: &ReferenceZone) -> Self {
        let start = zone.midnight(date);
        Self {
            date,
            start,
            end: start + Duration::hours(24),
        }
    }

    /// Half-open containment check.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}
