use std::env;

use serde::Serialize;
use stockroom_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig, AUTH_TOKEN_ENV};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            server_url,
            user_id,
            auth_token,
            request_timeout,
            retry_delay,
            sync_interval,
            no_activate,
        } => {
            let updates = ProfileUpdate {
                server_url,
                user_id,
                auth_token,
                request_timeout_secs: request_timeout,
                retry_delay_secs: retry_delay,
                sync_interval_secs: sync_interval,
            };
            run_config_init(profile.as_deref().or(global_profile), updates, no_activate)
        }
        ConfigCommands::Show { json } => run_config_show(global_profile, json),
    }
}

/// Values passed to `config init`; unset fields keep the stored value
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub server_url: Option<String>,
    pub user_id: Option<String>,
    pub auth_token: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub sync_interval_secs: Option<u64>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut CliProfile) {
        if let Some(value) = normalize_text_option(self.server_url) {
            profile.server_url = Some(value);
        }
        if let Some(value) = normalize_text_option(self.user_id) {
            profile.user_id = Some(value);
        }
        if let Some(value) = normalize_text_option(self.auth_token) {
            profile.auth_token = Some(value);
        }
        if self.request_timeout_secs.is_some() {
            profile.request_timeout_secs = self.request_timeout_secs;
        }
        if self.retry_delay_secs.is_some() {
            profile.retry_delay_secs = self.retry_delay_secs;
        }
        if self.sync_interval_secs.is_some() {
            profile.sync_interval_secs = self.sync_interval_secs;
        }
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    updates: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    updates.apply(profile);
    profile.validate().map_err(CliError::Config)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profile(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = profile.missing_fields(env::var(AUTH_TOKEN_ENV).ok().as_deref());
    if missing_fields.is_empty() {
        println!("Sync profile '{profile_name}' is ready. Run `stockroom sync run`.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub profile: String,
    pub active: bool,
    pub server_url: Option<String>,
    pub user_id: Option<String>,
    pub auth_token: Option<&'static str>,
    pub request_timeout_secs: Option<u64>,
    pub retry_delay_secs: Option<u64>,
    pub sync_interval_secs: Option<u64>,
    pub missing: Vec<&'static str>,
}

/// Token is never printed; only where it comes from
pub fn profile_view(
    config: &CliProfilesConfig,
    profile_name: &str,
    env_token: Option<&str>,
) -> ProfileView {
    let profile = config.profile(profile_name).cloned().unwrap_or_default();
    let token_source = if normalize_text_option(env_token.map(str::to_string)).is_some() {
        Some("env")
    } else if normalize_text_option(profile.auth_token.clone()).is_some() {
        Some("profile")
    } else {
        None
    };

    ProfileView {
        profile: profile_name.to_string(),
        active: config.active_profile.as_deref() == Some(profile_name),
        server_url: profile.server_url(),
        user_id: profile.user_id(),
        auth_token: token_source,
        request_timeout_secs: profile.request_timeout_secs,
        retry_delay_secs: profile.retry_delay_secs,
        sync_interval_secs: profile.sync_interval_secs,
        missing: profile.missing_fields(env_token),
    }
}

pub fn run_config_show(profile_name: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let view = profile_view(
        &config,
        &profile_name,
        env::var(AUTH_TOKEN_ENV).ok().as_deref(),
    );

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!(
        "Profile:          {}{}",
        view.profile,
        if view.active { " (active)" } else { "" }
    );
    println!(
        "Server URL:       {}",
        view.server_url.as_deref().unwrap_or("-")
    );
    println!("User id:          {}", view.user_id.as_deref().unwrap_or("-"));
    let token_line = match view.auth_token {
        Some("env") => format!("set via {AUTH_TOKEN_ENV}"),
        Some(_) => "stored in profile".to_string(),
        None => "not set".to_string(),
    };
    println!("Auth token:       {token_line}");
    for (label, value) in [
        ("Request timeout", view.request_timeout_secs),
        ("Retry delay", view.retry_delay_secs),
        ("Sync interval", view.sync_interval_secs),
    ] {
        println!(
            "{:<17} {}",
            format!("{label}:"),
            value.map_or_else(|| "default".to_string(), |secs| format!("{secs}s"))
        );
    }
    if !view.missing.is_empty() {
        println!("Missing:          {}", view.missing.join(", "));
    }
    Ok(())
}
