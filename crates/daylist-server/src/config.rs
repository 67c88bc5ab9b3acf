//! Server configuration.
//!
//! Settings live in `~/.config/daylist/config.toml` by default. Every value
//! can be overridden from the environment (a `.env` file in the working
//! directory is loaded first by the binary):
//!
//! | variable               | setting                 |
//! |------------------------|-------------------------|
//! | `GOOGLE_CLIENT_ID`     | `google.client_id`      |
//! | `GOOGLE_CLIENT_SECRET` | `google.client_secret`  |
//! | `DAYLIST_BASE_URL`     | `server.base_url`       |
//! | `DAYLIST_BIND`         | `server.bind`           |
//! | `DAYLIST_DATABASE_URL` | `database.url`          |
//! | `DAYLIST_TIMEZONE`     | `sync.timezone`         |
//! | `CRON_SECRET`          | `server.cron_secret`    |
//!
//! Credential values support `env::VAR` and `file::PATH` references.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use daylist_core::ReferenceZone;
use daylist_providers::{GoogleConfig, OAuthCredentials};

use crate::error::{ServerError, ServerResult};
use crate::scheduler::DailySchedule;

/// Configuration for the daylist server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpSettings,
    pub google: GoogleSettings,
    pub sync: SyncSettings,
    pub reminder: ReminderSettings,
    pub database: DatabaseSettings,
}

/// HTTP listener and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Listen address.
    pub bind: String,
    /// Public URL of the deployment, used for OAuth redirects.
    pub base_url: String,
    /// Bearer secret required on `/api/cron/*` when set.
    pub cron_secret: Option<String>,
    /// Session lifetime in days.
    pub session_ttl_days: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            base_url: "http://localhost:3000".to_string(),
            cron_secret: None,
            session_ttl_days: 30,
        }
    }
}

/// Google OAuth and Calendar API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `env::` and `file::` prefixes).
    pub client_id: Option<String>,
    /// OAuth client secret (supports `env::` and `file::` prefixes).
    pub client_secret: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Endpoint overrides, mostly for testing against a local mock.
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub api_base: Option<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            timeout_secs: 30,
            auth_url: None,
            token_url: None,
            userinfo_url: None,
            api_base: None,
        }
    }
}

/// Daily todo creation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub enabled: bool,
    /// IANA name of the reference zone used for day buckets and schedules.
    pub timezone: String,
    /// Cron expression on the reference zone's wall clock.
    pub schedule: String,
    /// Calendars turned into todos for every user.
    pub calendar_ids: Vec<String>,
    /// Upper bound on one user's sync, in seconds.
    pub user_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: daylist_core::DEFAULT_ZONE.name().to_string(),
            schedule: "0 0 * * *".to_string(),
            calendar_ids: vec!["primary".to_string()],
            user_timeout_secs: 60,
        }
    }
}

/// Evening reminder job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub enabled: bool,
    pub schedule: String,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: "0 21 * * *".to_string(),
        }
    }
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// sqlx connection URL, e.g. `sqlite://daylist.db?mode=rwc`.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> ServerResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| ServerError::config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daylist")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daylist")
    }

    /// Overlays values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlays values from `lookup`; empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(v);
        }
        if let Some(v) = get("DAYLIST_BASE_URL") {
            self.server.base_url = v;
        }
        if let Some(v) = get("DAYLIST_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = get("DAYLIST_DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Some(v) = get("DAYLIST_TIMEZONE") {
            self.sync.timezone = v;
        }
        if let Some(v) = get("CRON_SECRET") {
            self.server.cron_secret = Some(v);
        }
    }

    /// The reference zone for day buckets and schedules.
    pub fn zone(&self) -> ServerResult<ReferenceZone> {
        self.sync
            .timezone
            .parse()
            .map_err(|e| ServerError::config(format!("sync.timezone: {e}")))
    }

    pub fn bind_addr(&self) -> ServerResult<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|e| ServerError::config(format!("server.bind '{}': {e}", self.server.bind)))
    }

    /// Database URL, defaulting to `daylist.db` in the data directory.
    pub fn database_url(&self) -> String {
        self.database.url.clone().unwrap_or_else(|| {
            let path = Self::default_data_dir().join("daylist.db");
            format!("sqlite://{}?mode=rwc", path.display())
        })
    }

    /// OAuth callback registered with Google.
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}/api/auth/callback/google",
            self.server.base_url.trim_end_matches('/')
        )
    }

    pub fn sync_schedule(&self) -> ServerResult<DailySchedule> {
        DailySchedule::parse(&self.sync.schedule, self.zone()?)
            .map_err(|e| ServerError::config(format!("sync.schedule: {e}")))
    }

    pub fn reminder_schedule(&self) -> ServerResult<DailySchedule> {
        DailySchedule::parse(&self.reminder.schedule, self.zone()?)
            .map_err(|e| ServerError::config(format!("reminder.schedule: {e}")))
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.user_timeout_secs.max(1))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.server.session_ttl_days.max(1)))
    }

    /// Resolves Google OAuth credentials, expanding secret references.
    pub fn resolve_credentials(&self) -> ServerResult<OAuthCredentials> {
        let raw_id = self.google.client_id.as_deref().ok_or_else(|| {
            ServerError::config(format!(
                "Google credentials not found. Set GOOGLE_CLIENT_ID or add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"",
                Self::default_path().display()
            ))
        })?;
        let raw_secret = self.google.client_secret.as_deref().ok_or_else(|| {
            ServerError::config("client_secret is missing (GOOGLE_CLIENT_SECRET or [google] section)")
        })?;

        let client_id = crate::secret::resolve(raw_id)
            .map_err(|e| ServerError::config(format!("failed to resolve client_id: {e}")))?;
        let client_secret = crate::secret::resolve(raw_secret)
            .map_err(|e| ServerError::config(format!("failed to resolve client_secret: {e}")))?;

        let credentials = OAuthCredentials::new(client_id, client_secret);
        credentials
            .validate()
            .map_err(|e| ServerError::config(format!("invalid Google credentials: {e}")))?;
        Ok(credentials)
    }

    /// Builds the provider configuration.
    pub fn google_config(&self) -> ServerResult<GoogleConfig> {
        let mut config = GoogleConfig::new(self.resolve_credentials()?)
            .with_timeout(Duration::from_secs(self.google.timeout_secs.max(1)));

        if let Some(ref url) = self.google.auth_url {
            config = config.with_auth_url(url);
        }
        if let Some(ref url) = self.google.token_url {
            config = config.with_token_url(url);
        }
        if let Some(ref url) = self.google.userinfo_url {
            config = config.with_userinfo_url(url);
        }
        if let Some(ref url) = self.google.api_base {
            config = config.with_api_base(url);
        }

        config.validate().map_err(ServerError::config)?;
        Ok(config)
    }

    /// Resolves the cron secret, if one is configured.
    pub fn cron_secret(&self) -> ServerResult<Option<String>> {
        self.server
            .cron_secret
            .as_deref()
            .map(|raw| {
                crate::secret::resolve(raw)
                    .map_err(|e| ServerError::config(format!("failed to resolve cron_secret: {e}")))
            })
            .transpose()
    }

    /// Checks everything `serve` needs.
    pub fn validate(&self) -> ServerResult<()> {
        self.bind_addr()?;
        if !self.server.base_url.starts_with("http://") && !self.server.base_url.starts_with("https://") {
            return Err(ServerError::config(format!(
                "server.base_url must be an http(s) URL, got '{}'",
                self.server.base_url
            )));
        }
        self.zone()?;
        self.sync_schedule()?;
        self.reminder_schedule()?;
        if self.sync.calendar_ids.is_empty() {
            return Err(ServerError::config("sync.calendar_ids must not be empty"));
        }
        self.google_config()?;
        self.cron_secret()?;
        Ok(())
    }

    /// Copy safe to print: credential values are masked.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]".to_string());
        let mut copy = self.clone();
        copy.google.client_secret = mask(&self.google.client_secret);
        copy.server.cron_secret = mask(&self.server.cron_secret);
        copy
    }
}
