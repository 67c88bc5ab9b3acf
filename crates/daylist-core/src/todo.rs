//! Todo records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted todo.
///
/// `date` is the day bucket: local midnight of the todo's day in the
/// reference zone. `owner_user_id` and `created_at` never change after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    #[serde(rename = "userId")]
    pub owner_user_id: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    /// Calendar event this todo was created from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<String>,
}

impl Todo {
    /// Whether `user_id` owns this todo.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_user_id == user_id
    }
}

/// Input for creating a todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub owner_user_id: String,
    pub content: String,
    pub date: DateTime<Utc>,
    pub source_event_id: Option<String>,
}

impl NewTodo {
    pub fn new(
        owner_user_id: impl Into<String>,
        content: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
            content: content.into(),
            date,
            source_event_id: None,
        }
    }

    /// Builder: remember the calendar event the todo comes from.
    pub fn with_source_event(mut self, event_id: impl Into<String>) -> Self {
        self.source_event_id = Some(event_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_like_the_api() {
        let todo = Todo {
            id: "t1".into(),
            owner_user_id: "u1".into(),
            content: "Write report".into(),
            date: Utc.with_ymd_and_hms(2025, 11, 10, 15, 0, 0).unwrap(),
            is_completed: false,
            created_at: Utc.with_ymd_and_hms(2025, 11, 10, 16, 0, 0).unwrap(),
            source_event_id: None,
        };
        let json = serde_json::to_value(&todo).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["isCompleted"], false);
        assert_eq!(json["date"], "2025-11-10T15:00:00Z");
        assert!(json.get("sourceEventId").is_none());
        assert!(todo.is_owned_by("u1"));
        assert!(!todo.is_owned_by("u2"));
    }
}
