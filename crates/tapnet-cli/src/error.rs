//! Error handling for the tapnet CLI

use tapnet_core::TapnetError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Tapnet error: {0}")]
    Tapnet(#[from] TapnetError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML encoding error: {0}")]
    TomlEncoding(#[from] toml::ser::Error),

    #[error("No report for {action} within {timeout_ms}ms")]
    ReportTimeout { action: String, timeout_ms: u64 },

    #[error("Runtime stopped before the press was handled")]
    RuntimeStopped,
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
