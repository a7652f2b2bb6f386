//! Client configuration.
//!
//! Endpoint paths, the privileged route prefixes that steer failure
//! recovery, and the settling delay applied before a recovery navigation.
//!
//! Configuration is stored at `~/.config/datashare-admin/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/storage directory paths
const APP_NAME: &str = "datashare-admin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the platform API.
    pub base_url: String,

    // API paths.
    pub login_path: String,
    pub logout_path: String,
    pub refresh_path: String,
    pub profile_path: String,
    pub roles_path: String,
    /// Template path; `{id}` is replaced with the institution id.
    pub institution_path: String,

    /// UI route of the login entry point.
    pub login_route: String,

    /// Route prefixes that get a redirect-to-login (with resume) instead of
    /// a reload when the session cannot be restored.
    pub privileged_prefixes: Vec<String>,

    /// Delay before the recovery navigation, letting in-flight cache
    /// invalidation settle.
    pub settle_delay_ms: u64,

    /// Outbound request timeout.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://api.datashare.example.org".to_string(),
            login_path: "/auth/login".to_string(),
            logout_path: "/auth/logout".to_string(),
            refresh_path: "/auth/refresh".to_string(),
            profile_path: "/users/me".to_string(),
            roles_path: "/users/me/roles".to_string(),
            institution_path: "/institutions/{id}".to_string(),
            login_route: "/login".to_string(),
            privileged_prefixes: vec!["/admin".to_string(), "/profile".to_string()],
            settle_delay_ms: 300,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the durable credential/session store.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
