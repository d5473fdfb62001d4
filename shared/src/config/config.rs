use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

use crate::types::client_config::{ClientConfig, ConfigError};

pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from: {}", path.display());

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path.display());

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: ClientConfig = toml::from_str(&contents)?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    let base_url = config.api.resolved_base_url();

    if base_url.is_empty() {
        return Err(ConfigError::InvalidConfig("base_url cannot be empty".into()));
    }

    // The transport has no TLS connector.
    if base_url.starts_with("https://") {
        return Err(ConfigError::InvalidConfig(format!(
            "base_url {} needs TLS, which this client does not speak; use http:// behind a TLS-terminating proxy",
            base_url
        )));
    }

    if !base_url.starts_with("http://") {
        return Err(ConfigError::InvalidConfig(format!(
            "base_url must be an http URL, got {}",
            base_url
        )));
    }

    if config.api.timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "timeout_secs must be greater than 0".into(),
        ));
    }

    if config.session.store_path.as_os_str().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "store_path cannot be empty".into(),
        ));
    }

    let booking = &config.booking;
    if booking.last_hour > 23 {
        return Err(ConfigError::InvalidConfig(
            "last_hour must be between 0 and 23".into(),
        ));
    }

    if booking.first_hour > booking.last_hour {
        return Err(ConfigError::InvalidConfig(
            "first_hour must not be after last_hour".into(),
        ));
    }

    Ok(())
}
