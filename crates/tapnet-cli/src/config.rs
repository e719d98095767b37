//! Configuration loading for the tapnet CLI
//!
//! The file is TOML over [`TapnetConfig::default`]: every section and field is
//! optional. Command line overrides are applied after loading, then the
//! result is validated.

use std::fs;
use std::path::Path;
use tapnet_core::TapnetConfig;
use tracing::info;

use crate::error::{CliError, Result};

/// Parse TOML text into a validated configuration
pub fn parse_config(text: &str) -> Result<TapnetConfig> {
    let config: TapnetConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<TapnetConfig> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_config(&text)
}

/// Load from `path` if given, otherwise use the defaults
pub fn load_configuration(path: Option<&str>, settings: Option<&str>) -> Result<TapnetConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            load_from_file(path)?
        }
        None => {
            info!("Using default configuration");
            TapnetConfig::default()
        }
    };

    if let Some(settings) = settings {
        config.storage.path = Some(settings.to_string());
    }
    config.validate()?;
    Ok(config)
}

/// Render the effective configuration as TOML
pub fn render_config(config: &TapnetConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
