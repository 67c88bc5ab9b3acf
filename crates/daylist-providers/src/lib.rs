//! Calendar provider trait, the Google Calendar client and the OAuth token
//! lifecycle.
//!
//! - [`CalendarProvider`] - what a calendar backend must answer
//! - [`GoogleCalendarClient`] - Calendar API v3 implementation
//! - [`SessionTokenManager`] - keeps a session's access token fresh
//! - [`fetch_merged_events`] - fan-out across calendars with partial results
//!
//! # Example
//!
//! ```ignore
//! use daylist_providers::{fetch_merged_events, CalendarProvider};
//!
//! let calendars = provider.list_calendars(&token).await?;
//! let merged = fetch_merged_events(&provider, &token, &calendars, &resolver, date).await;
//! for event in merged.events {
//!     println!("{}", event.todo_content());
//! }
//! ```

pub mod error;
pub mod google;
pub mod merge;
pub mod provider;
pub mod token;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use google::{GoogleCalendarClient, GoogleConfig, GoogleUser, OAuthClient, OAuthCredentials, PkceFlow};
pub use merge::{CalendarFailure, MergedEvents, fetch_merged_events};
pub use provider::{BoxFuture, CalendarProvider};
pub use token::{
    DEFAULT_TOKEN_LIFETIME_SECS, MaterializeOutcome, Materialized, RefreshError, SessionTokenManager,
    TokenErrorTag, TokenGrant, TokenRefresher, TokenState,
};
