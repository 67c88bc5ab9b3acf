//! CalendarProvider trait definition.
//!
//! Providers are stateless with respect to users: the caller materializes a
//! valid access token for the user first and passes it on every call.

use std::future::Future;
use std::pin::Pin;

use daylist_core::{CalendarEvent, CalendarInfo, DayWindow};

use crate::error::ProviderResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read-only access to a user's calendars.
///
/// # Example Implementation
///
/// ```ignore
/// impl CalendarProvider for FixedProvider {
///     fn name(&self) -> &str { "fixed" }
///
///     fn list_calendars<'a>(&'a self, _token: &'a str)
///         -> BoxFuture<'a, ProviderResult<Vec<CalendarInfo>>>
///     {
///         Box::pin(async move { Ok(self.calendars.clone()) })
///     }
///     // ...
/// }
/// ```
pub trait CalendarProvider: Send + Sync {
    /// Provider name used in logs and errors (e.g. "google").
    fn name(&self) -> &str;

    /// Lists the calendars visible to the token's owner.
    fn list_calendars<'a>(
        &'a self,
        access_token: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarInfo>>>;

    /// Lists events of one calendar overlapping `window`.
    ///
    /// Recurring events are expanded into instances and cancelled events
    /// are dropped. The caller applies the day filter.
    fn list_events<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        window: &'a DayWindow,
    ) -> BoxFuture<'a, ProviderResult<Vec<CalendarEvent>>>;
}
