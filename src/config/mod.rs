//! Configuration management for Vigora

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Default API base URL (the platform's Express backend mounts under `/api`)
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Name of the session file stored next to the config file
const SESSION_FILE_NAME: &str = "session.yaml";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the Vigora API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Interval between QR login polls, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub qr_poll_interval_secs: u64,

    /// User preferences
    #[serde(default)]
    pub preferences: Preferences,
}

/// User preferences
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: None,
            qr_poll_interval_secs: default_poll_interval_secs(),
            preferences: Preferences::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".vigora").join("config.yaml"))
    }

    /// Resolve the config path from an optional override
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Path of the session file belonging to a config file
    pub fn session_path_for(config_path: &Path) -> PathBuf {
        match config_path.parent() {
            Some(dir) => dir.join(SESSION_FILE_NAME),
            None => PathBuf::from(SESSION_FILE_NAME),
        }
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file is not an error: the CLI works against the default
    /// API without any setup.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        if config.qr_poll_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("qr_poll_interval_secs must be at least 1".to_string()).into(),
            );
        }

        Ok(config)
    }

    /// Resolve the API base URL.
    ///
    /// Precedence: CLI flag / environment (already merged by clap) > config file > default.
    pub fn api_url(&self, override_url: Option<&str>) -> String {
        override_url
            .map(str::to_string)
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Interval between QR login polls
    pub fn qr_poll_interval(&self) -> Duration {
        Duration::from_secs(self.qr_poll_interval_secs)
    }
}
