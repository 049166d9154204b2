//! Configuration loading.
//!
//! Settings come from one JSON file. An explicit path (the first CLI
//! argument) must exist. Without one, the default location is tried:
//!
//! - **Linux/macOS:** `~/.mcp-engine/config.json`
//! - **Windows:** `%USERPROFILE%\.mcp-engine\config.json`
//!
//! and if nothing is there the built-in defaults apply, so the binary runs
//! with no setup at all.

mod settings;

pub use settings::{ClientConfig, Config, HttpConfig, LoggingConfig, ServerConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-engine/`
/// - **Windows:** `%USERPROFILE%\.mcp-engine\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-engine"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads, parses and validates the configuration.
///
/// With `path == None` the default location is used, falling back to
/// [`Config::default`] when no file exists there.
///
/// # Errors
///
/// - [`ConfigError::NotFound`] for an explicit path that does not exist
/// - [`ConfigError::ReadError`] / [`ConfigError::ParseError`] for I/O or
///   JSON failures, including unknown fields
/// - [`ConfigError::ValidationError`] for out-of-range values
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                tracing::debug!("No configuration file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.clone(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.clone(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}
