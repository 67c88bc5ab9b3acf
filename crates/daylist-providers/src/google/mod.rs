//! Google integration: Calendar API v3 and OAuth 2.0.
//!
//! - [`GoogleCalendarClient`] implements [`CalendarProvider`] with a
//!   per-call bearer token
//! - [`OAuthClient`] handles sign-in (PKCE), userinfo and refresh, and
//!   implements [`TokenRefresher`]
//!
//! ```ignore
//! use daylist_providers::google::{GoogleCalendarClient, GoogleConfig, OAuthClient, OAuthCredentials};
//!
//! let config = GoogleConfig::new(OAuthCredentials::new(client_id, client_secret));
//! let calendar = GoogleCalendarClient::new(&config)?;
//! let oauth = OAuthClient::new(config)?;
//! ```
//!
//! [`CalendarProvider`]: crate::provider::CalendarProvider
//! [`TokenRefresher`]: crate::token::TokenRefresher

mod client;
mod config;
mod oauth;

pub use client::GoogleCalendarClient;
pub use config::{
    CALENDAR_API_BASE, DEFAULT_SCOPES, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GOOGLE_USERINFO_URL,
    GoogleConfig, OAuthCredentials,
};
pub use oauth::{GoogleUser, OAuthClient, PkceFlow};
