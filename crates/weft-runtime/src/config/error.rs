//! Configuration file loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while locating and parsing a configuration file.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    /// File not found at the specified path.
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Failed to read the configuration file.
    #[error("Failed to read configuration file: {0}")]
    Read(#[from] std::io::Error),

    /// YAML/figment parsing error.
    #[error("Configuration parse error: {0}")]
    Parse(String),
}

/// Result type for configuration loading.
pub type ConfigLoadResult<T> = Result<T, ConfigLoadError>;
