//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, last used username, token storage backend and timing settings.
//!
//! Configuration is stored at `~/.config/emoscope/config.json`. Environment
//! variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::auth::{
    FileTokenStore, KeyringTokenStore, SessionManager, TokenStore, DEFAULT_REVALIDATE_MINUTES,
};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "emoscope";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `api_base_url`
pub const ENV_API_URL: &str = "EMOSCOPE_API_URL";

/// Overrides `last_username` as the default login name
pub const ENV_USERNAME: &str = "EMOSCOPE_USERNAME";

/// Where the bearer token is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub last_username: Option<String>,
    pub token_backend: TokenBackend,
    pub request_timeout_secs: u64,
    pub revalidate_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            last_username: None,
            token_backend: TokenBackend::File,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            revalidate_minutes: DEFAULT_REVALIDATE_MINUTES,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_API_URL).ok(),
            std::env::var(ENV_USERNAME).ok(),
        );
    }

    fn apply_overrides(&mut self, api_url: Option<String>, username: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(name) = username.filter(|n| !n.trim().is_empty()) {
            self.last_username = Some(name);
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the token file and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn revalidate_period(&self) -> Duration {
        Duration::from_secs(self.revalidate_minutes.max(1) * 60)
    }

    pub fn token_store(&self) -> Result<Box<dyn TokenStore>> {
        Ok(match self.token_backend {
            TokenBackend::File => Box::new(FileTokenStore::new(self.data_dir()?)),
            TokenBackend::Keyring => Box::new(KeyringTokenStore::new(self.keyring_account())),
        })
    }

    /// One keychain entry per API server
    fn keyring_account(&self) -> String {
        format!("token@{}", self.api_base_url.trim_end_matches('/'))
    }

    /// Build the session for this configuration. The session starts
    /// `Unknown`; call `initialize` to restore it.
    pub fn session(&self) -> Result<SessionManager> {
        let api = ApiClient::with_timeout(&self.api_base_url, self.request_timeout())
            .context("Failed to build HTTP client")?;
        Ok(SessionManager::new(api, self.token_store()?))
    }
}
