pub mod config;

pub use self::config::{load_config, validate_config};

use std::path::Path;

use tracing::info;

use crate::types::client_config::{ClientConfig, ConfigError};

/// Load `path` when given, otherwise fall back to the built-in defaults
/// (still validated, so a bad `MRMS_API_URL` is caught either way).
pub fn load_or_default(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    match path {
        Some(p) => load_config(p),
        None => {
            info!("No configuration file given, using defaults");
            let config = ClientConfig::default();
            validate_config(&config)?;
            Ok(config)
        }
    }
}
