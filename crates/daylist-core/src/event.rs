//! Calendar event and calendar metadata.
//!
//! Events are ephemeral: they are fetched per request or per sync run and
//! never persisted. Only the todos created from them are.

use serde::{Deserialize, Serialize};

use crate::time::EventTime;

/// A calendar event as returned by a provider for one calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    /// Provider-side identifier, stable across fetches.
    pub id: String,
    /// Event title; may be empty.
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    /// For all-day events this date is exclusive.
    pub end: EventTime,
    /// Identifier of the calendar the event was fetched from.
    pub calendar_id: String,
    /// Display name of the source calendar, filled in when merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_color: Option<String>,
}

impl CalendarEvent {
    /// Creates a new event with the required fields.
    pub fn new(
        id: impl Into<String>,
        summary: impl Into<String>,
        start: EventTime,
        end: EventTime,
        calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            description: None,
            location: None,
            start,
            end,
            calendar_id: calendar_id.into(),
            calendar_name: None,
            background_color: None,
            foreground_color: None,
        }
    }

    /// True iff the start is a bare date.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Copies display metadata from the calendar the event belongs to.
    pub fn decorate(&mut self, calendar: &CalendarInfo) {
        self.calendar_name = Some(calendar.summary.clone());
        self.background_color = calendar.background_color.clone();
        self.foreground_color = calendar.foreground_color.clone();
    }

    /// Title to use for a todo created from this event.
    pub fn todo_content(&self) -> String {
        let trimmed = self.summary.trim();
        if trimmed.is_empty() {
            UNTITLED_EVENT.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Fallback todo content for events without a title.
pub const UNTITLED_EVENT: &str = "Untitled Event";

/// Information about one calendar the user can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInfo {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    #[serde(default)]
    pub primary: bool,
    /// Caller's role on the calendar (`owner`, `reader`, ...).
    pub access_role: Option<String>,
    pub background_color: Option<String>,
    pub foreground_color: Option<String>,
    #[serde(default)]
    pub selected: bool,
}

impl CalendarInfo {
    /// Creates calendar info with the given id and display name.
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            description: None,
            primary: false,
            access_role: None,
            background_color: None,
            foreground_color: None,
            selected: false,
        }
    }

    /// Builder: set colours.
    pub fn with_colors(
        mut self,
        background: impl Into<String>,
        foreground: impl Into<String>,
    ) -> Self {
        self.background_color = Some(background.into());
        self.foreground_color = Some(foreground.into());
        self
    }
}
