use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Where the CLI keeps `token` / `role` / `name` between runs.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

/// Opening hours rendered as the slot grid, inclusive on both ends.
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default = "default_first_hour")]
    pub first_hour: u8,
    #[serde(default = "default_last_hour")]
    pub last_hour: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub booking: BookingConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the API base URL with `MRMS_API_URL` taking priority over the
    /// config file field. Trailing slashes are dropped so paths can be
    /// appended directly.
    pub fn resolved_base_url(&self) -> String {
        std::env::var("MRMS_API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone())
            .trim()
            .trim_end_matches('/')
            .to_string()
    }
}

impl BookingConfig {
    pub fn hours(&self) -> std::ops::RangeInclusive<u8> {
        self.first_hour..=self.last_hour
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            first_hour: default_first_hour(),
            last_hour: default_last_hour(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            session: SessionConfig::default(),
            booking: BookingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_base_url() -> String {
    "http://localhost:4001/api".to_string()
}

pub fn default_timeout() -> u64 {
    30
}

pub fn default_store_path() -> PathBuf {
    PathBuf::from(".mrms-session.toml")
}

pub fn default_first_hour() -> u8 {
    9
}

pub fn default_last_hour() -> u8 {
    16
}
