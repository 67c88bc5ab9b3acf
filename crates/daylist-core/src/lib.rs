//! Core types: reference zone, day windows, calendar events, todos, tracing

pub mod event;
pub mod time;
pub mod todo;
pub mod tracing;
pub mod window;

pub use event::{CalendarEvent, CalendarInfo, UNTITLED_EVENT};
pub use time::{
    DEFAULT_ZONE, DayWindow, EventTime, ReferenceZone, TimeParseError, add_days, parse_date,
};
pub use todo::{NewTodo, Todo};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::CalendarWindowResolver;
