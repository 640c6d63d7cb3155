//! Sync configuration.
//!
//! `SyncConfig` is passed explicitly into the push/pull tasks and the
//! scheduler. There is no process-wide sync state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

const PUSH_PATH: &str = "/sync/push";
const PULL_PATH: &str = "/sync/pull";

/// Connection settings for the authoritative sync server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL, e.g. `https://sync.example.com/api`
    pub server_url: String,
    /// Bearer token sent with every request
    pub auth_token: String,
    /// Identity of this replica's user, sent with pull requests
    pub user_id: String,
    /// Bound on a single network call
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
    /// Fixed backoff after a failed task run
    #[serde(default = "default_retry_delay", with = "duration_secs")]
    pub retry_delay: Duration,
    /// Period of the background scheduler
    #[serde(default = "default_sync_interval", with = "duration_secs")]
    pub sync_interval: Duration,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("server_url", &self.server_url)
            .field("auth_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("request_timeout", &self.request_timeout)
            .field("retry_delay", &self.retry_delay)
            .field("sync_interval", &self.sync_interval)
            .finish()
    }
}

impl SyncConfig {
    /// Create a config with default timings.
    pub fn new(
        server_url: impl Into<String>,
        auth_token: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into().trim().trim_end_matches('/').to_string(),
            auth_token: auth_token.into().trim().to_string(),
            user_id: user_id.into().trim().to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Check that the config can be used to reach a server.
    pub fn validate(&self) -> Result<()> {
        let url = normalize_text_option(Some(self.server_url.clone()))
            .ok_or_else(|| Error::Config("server_url must not be empty".to_string()))?;
        if !is_http_url(&url) {
            return Err(Error::Config(
                "server_url must include http:// or https://".to_string(),
            ));
        }
        if self.auth_token.trim().is_empty() {
            return Err(Error::Config("auth_token must not be empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("user_id must not be empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.sync_interval.is_zero() {
            return Err(Error::Config(
                "sync_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn push_url(&self) -> String {
        format!("{}{PUSH_PATH}", self.base_url())
    }

    pub fn pull_url(&self) -> String {
        format!("{}{PULL_PATH}", self.base_url())
    }

    fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }
}

const fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

const fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

const fn default_sync_interval() -> Duration {
    DEFAULT_SYNC_INTERVAL
}

/// Durations are stored as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> SyncConfig {
        SyncConfig::new("https://sync.example.com/api/", "secret-token", "user-1")
    }

    #[test]
    fn defaults_and_endpoints() {
        let config = config();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_delay, Duration::from_secs(300));
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.push_url(), "https://sync.example.com/api/sync/push");
        assert_eq!(config.pull_url(), "https://sync.example.com/api/sync/pull");
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut bad_url = config();
        bad_url.server_url = "sync.example.com".to_string();
        assert!(matches!(bad_url.validate(), Err(Error::Config(_))));

        let no_token = SyncConfig::new("https://sync.example.com", " ", "user-1");
        assert!(matches!(no_token.validate(), Err(Error::Config(_))));

        let no_user = SyncConfig::new("https://sync.example.com", "token", "");
        assert!(matches!(no_user.validate(), Err(Error::Config(_))));

        let zero_timeout = config().with_request_timeout(Duration::ZERO);
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn deserializes_with_default_timings() {
        let parsed: SyncConfig = serde_json::from_str(
            r#"{"server_url":"http://localhost:8080","auth_token":"t","user_id":"u","retry_delay":10}"#,
        )
        .unwrap();
        assert_eq!(parsed.retry_delay, Duration::from_secs(10));
        assert_eq!(parsed.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
