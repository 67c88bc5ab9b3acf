//! Google OAuth and Calendar API configuration.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, Secret};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Scopes requested at sign-in: identity plus read-only calendar access.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// OAuth 2.0 web client credentials from the Google Cloud Console.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
        }
    }

    /// Checks that both values are present and the id looks like a Google one.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Endpoints and limits for the Google integration.
///
/// Endpoint URLs are overridable so tests can point them at a mock server.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub api_base: String,
    /// Per-request timeout for every Google call.
    pub timeout: Duration,
}

impl GoogleConfig {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
            api_base: CALENDAR_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Builder: set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: point the consent page elsewhere.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Builder: point the token endpoint elsewhere.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Builder: point the userinfo endpoint elsewhere.
    pub fn with_userinfo_url(mut self, url: impl Into<String>) -> Self {
        self.userinfo_url = url.into();
        self
    }

    /// Builder: point the Calendar API elsewhere.
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        self.credentials.validate().map_err(String::from)?;
        for url in [&self.auth_url, &self.token_url, &self.userinfo_url, &self.api_base] {
            url::Url::parse(url).map_err(|e| format!("invalid URL '{url}': {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> OAuthCredentials {
        OAuthCredentials::new("test-client.apps.googleusercontent.com", "test-secret")
    }

    #[test]
    fn defaults_point_at_google() {
        let config = GoogleConfig::new(credentials());
        assert_eq!(config.token_url, GOOGLE_TOKEN_URL);
        assert_eq!(config.api_base, CALENDAR_API_BASE);
        assert!(config.scopes.iter().any(|s| s.ends_with("calendar.readonly")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn credentials_validation() {
        assert!(OAuthCredentials::new("", "s").validate().is_err());
        assert!(OAuthCredentials::new("not-google", "s").validate().is_err());
        assert!(OAuthCredentials::new("x.apps.googleusercontent.com", "").validate().is_err());
        assert!(credentials().validate().is_ok());
    }

    #[test]
    fn api_base_trailing_slash_trimmed() {
        let config = GoogleConfig::new(credentials()).with_api_base("http://127.0.0.1:1234/");
        assert_eq!(config.api_base, "http://127.0.0.1:1234");
    }

    #[test]
    fn debug_hides_secret() {
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("test-secret"));
    }

    #[test]
    fn rejects_bad_endpoint() {
        let config = GoogleConfig::new(credentials()).with_token_url("not a url");
        assert!(config.validate().is_err());
    }
}
