//! Client configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! holds the EDS account, profile and endpoint settings, and derives the
//! immutable [`AccountIdentity`] the token manager authenticates with.
//!
//! Configuration is stored at `~/.config/edsclient/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::CredentialStore;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "edsclient";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_API_BASE_URL: &str = "https://eds-api.ebscohost.com/edsapi/rest";

pub const DEFAULT_AUTH_BASE_URL: &str = "https://eds-api.ebscohost.com/authservice/rest";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdsConfig {
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Authenticate by the caller's IP address instead of an account token.
    pub ip_auth: bool,
    pub profile: Option<String>,
    pub org_id: Option<String>,
    pub timeout_secs: u64,
    pub api_base_url: String,
    pub auth_base_url: String,
    /// Open sessions as a guest (`Guest: y`).
    pub guest: bool,
    /// Write token values to debug logs instead of redacting them.
    pub debug_tokens: bool,
}

impl Default for EdsConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            ip_auth: false,
            profile: None,
            org_id: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            guest: true,
            debug_tokens: false,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

impl EdsConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Overlay `EDS_*` environment variables on top of the file settings.
    pub fn apply_env(&mut self) {
        self.apply_vars(std::env::vars());
    }

    fn apply_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                "EDS_USERNAME" => self.username = Some(value),
                "EDS_PASSWORD" => self.password = Some(value),
                "EDS_IP_AUTH" => self.ip_auth = parse_flag(&value),
                "EDS_PROFILE" => self.profile = Some(value),
                "EDS_ORG_ID" => self.org_id = Some(value),
                "EDS_TIMEOUT_SECS" => match value.trim().parse() {
                    Ok(secs) => self.timeout_secs = secs,
                    Err(_) => warn!(value = %value, "Ignoring invalid EDS_TIMEOUT_SECS"),
                },
                "EDS_API_BASE_URL" => self.api_base_url = value,
                "EDS_AUTH_BASE_URL" => self.auth_base_url = value,
                "EDS_GUEST" => self.guest = parse_flag(&value),
                "EDS_DEBUG_TOKENS" => self.debug_tokens = parse_flag(&value),
                _ => {}
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(ref profile) = self.profile {
            path = path.join(profile);
        }
        Ok(path)
    }
}

/// The EDS account a client authenticates as. Fixed for the life of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountIdentity {
    pub username: Option<String>,
    pub password: Option<String>,
    pub ip_auth: bool,
    pub profile: Option<String>,
    pub org_id: Option<String>,
    pub guest: bool,
}

impl AccountIdentity {
    /// Identity for username/password authentication.
    pub fn with_credentials(
        username: impl Into<String>,
        password: impl Into<String>,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            profile: Some(profile.into()),
            guest: true,
            ..Self::default()
        }
    }

    /// Identity for IP-authenticated access; no authentication token is used.
    pub fn ip_authenticated(profile: impl Into<String>) -> Self {
        Self {
            ip_auth: true,
            profile: Some(profile.into()),
            guest: true,
            ..Self::default()
        }
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Build the identity from `config`. When a username is configured
    /// without a password, the password is looked up in `keychain`.
    pub fn from_config(config: &EdsConfig, keychain: &CredentialStore) -> Self {
        let mut password = config.password.clone().filter(|p| !p.is_empty());
        if password.is_none() && !config.ip_auth {
            if let Some(username) = config.username.as_deref().filter(|u| !u.is_empty()) {
                match keychain.password(username) {
                    Ok(found) => {
                        debug!(username, found = found.is_some(), "Keychain password lookup");
                        password = found;
                    }
                    Err(e) => warn!(error = %e, "Keychain lookup failed"),
                }
            }
        }

        Self {
            username: config.username.clone(),
            password,
            ip_auth: config.ip_auth,
            profile: config.profile.clone(),
            org_id: config.org_id.clone(),
            guest: config.guest,
        }
    }

    /// Username and password, when both are present and non-empty.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self.password.as_deref().filter(|p| !p.is_empty())?;
        Some((username, password))
    }
}
