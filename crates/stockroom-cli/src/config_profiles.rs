//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stockroom_core::util::{is_http_url, normalize_text_option};
use stockroom_core::SyncConfig;

const CONFIG_FILE_NAME: &str = "cli-config.json";
pub const PROFILE_ENV: &str = "STOCKROOM_PROFILE";
pub const AUTH_TOKEN_ENV: &str = "STOCKROOM_AUTH_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval_secs: Option<u64>,
}

impl std::fmt::Debug for CliProfile {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("CliProfile")
            .field("server_url", &self.server_url)
            .field("user_id", &self.user_id)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry_delay_secs", &self.retry_delay_secs)
            .field("sync_interval_secs", &self.sync_interval_secs)
            .finish()
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockroom")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// `--profile`, then `STOCKROOM_PROFILE`, then the active profile, then `default`
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with_env(
            explicit,
            std::env::var(PROFILE_ENV).ok().as_deref(),
        )
    }

    pub fn resolve_profile_name_with_env(
        &self,
        explicit: Option<&str>,
        env_profile: Option<&str>,
    ) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(env_profile))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn server_url(&self) -> Option<String> {
        normalize_text_option(self.server_url.clone())
            .map(|url| url.trim_end_matches('/').to_string())
    }

    pub fn user_id(&self) -> Option<String> {
        normalize_text_option(self.user_id.clone())
    }

    /// Check URL shape of whatever is set; missing values are reported later
    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.server_url() {
            if !is_http_url(&url) {
                return Err("server_url must include http:// or https://".to_string());
            }
        }
        for (name, value) in [
            ("request_timeout", self.request_timeout_secs),
            ("sync_interval", self.sync_interval_secs),
        ] {
            if value == Some(0) {
                return Err(format!("{name} must be greater than zero"));
            }
        }
        Ok(())
    }

    /// Names of settings still needed before sync can run
    pub fn missing_fields(&self, env_token: Option<&str>) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.server_url().is_none() {
            missing.push("server_url");
        }
        if self.user_id().is_none() {
            missing.push("user_id");
        }
        if self.auth_token(env_token).is_none() {
            missing.push("auth_token");
        }
        missing
    }

    /// `STOCKROOM_AUTH_TOKEN` wins over a token stored in the profile
    pub fn auth_token(&self, env_token: Option<&str>) -> Option<String> {
        normalize_text_option(env_token.map(str::to_string))
            .or_else(|| normalize_text_option(self.auth_token.clone()))
    }

    /// Build the engine config, or `None` when a required setting is missing.
    pub fn sync_config(&self, env_token: Option<&str>) -> Option<SyncConfig> {
        let mut config = SyncConfig::new(
            self.server_url()?,
            self.auth_token(env_token)?,
            self.user_id()?,
        );
        if let Some(secs) = self.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.retry_delay_secs {
            config = config.with_retry_delay(Duration::from_secs(secs));
        }
        if let Some(secs) = self.sync_interval_secs {
            config = config.with_sync_interval(Duration::from_secs(secs));
        }
        Some(config)
    }

    fn normalize(&mut self) {
        self.server_url = self.server_url();
        self.user_id = self.user_id();
        self.auth_token = normalize_text_option(self.auth_token.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn profile() -> CliProfile {
        CliProfile {
            server_url: Some(" https://sync.example.com/ ".to_string()),
            user_id: Some("user-1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" shop ".to_string()),
            profiles: BTreeMap::new(),
        };
        let mut shop = profile();
        shop.retry_delay_secs = Some(30);
        config.profiles.insert("shop".to_string(), shop);

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        let profile = loaded.profile("shop").unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("shop"));
        assert_eq!(profile.server_url.as_deref(), Some("https://sync.example.com"));
        assert_eq!(profile.retry_delay_secs, Some(30));
        assert_eq!(profile.auth_token, None);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let tmp = tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&tmp.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn resolve_profile_name_order() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(
            config.resolve_profile_name_with_env(Some("mobile"), Some("env")),
            "mobile"
        );
        assert_eq!(config.resolve_profile_name_with_env(None, Some("env")), "env");
        assert_eq!(config.resolve_profile_name_with_env(None, Some(" ")), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with_env(None, None),
            "default"
        );
    }

    #[test]
    fn env_token_overrides_profile_token() {
        let mut profile = profile();
        profile.auth_token = Some("stored".to_string());
        assert_eq!(profile.auth_token(Some("from-env")).as_deref(), Some("from-env"));
        assert_eq!(profile.auth_token(None).as_deref(), Some("stored"));
    }

    #[test]
    fn sync_config_requires_token() {
        let mut profile = profile();
        profile.sync_interval_secs = Some(15);
        assert!(profile.sync_config(None).is_none());
        assert_eq!(profile.missing_fields(None), vec!["auth_token"]);

        let config = profile.sync_config(Some("token")).unwrap();
        assert_eq!(config.server_url, "https://sync.example.com");
        assert_eq!(config.sync_interval, Duration::from_secs(15));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn validate_rejects_bad_url_and_zero_interval() {
        let mut bad = profile();
        bad.server_url = Some("sync.example.com".to_string());
        assert!(bad.validate().is_err());

        let mut zero = profile();
        zero.sync_interval_secs = Some(0);
        assert!(zero.validate().is_err());
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn debug_redacts_token() {
        let mut profile = profile();
        profile.auth_token = Some("secret".to_string());
        let debug = format!("{profile:?}");
        assert!(!debug.contains("secret"));
    }
}
