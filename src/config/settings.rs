//! Typed configuration sections.
//!
//! Every section is optional in the file; a missing section takes its
//! `Default`. Unknown keys are rejected so typos surface at startup.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Engine configuration as read from disk.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// `$schema` key, accepted so editors can validate the file.
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Free-form `_comment`, unused.
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Server identity.
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP binding settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Client timeouts.
    #[serde(default)]
    pub client: ClientConfig,

    /// Log verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Checks the constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(invalid("server.name must not be empty"));
        }

        if !self.http.path.starts_with('/') {
            return Err(invalid(format!(
                "Invalid http.path '{}'. Must start with '/'",
                self.http.path
            )));
        }

        if self.http.max_body_bytes == 0 {
            return Err(invalid("http.max_body_bytes must be greater than 0"));
        }

        if self.client.connect_timeout_ms == 0 {
            return Err(invalid("client.connect_timeout_ms must be greater than 0"));
        }

        if self.client.request_timeout_ms == 0 {
            return Err(invalid("client.request_timeout_ms must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        message: message.into(),
    }
}

/// Identity reported in `serverInfo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name. Default: the crate name.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Server version. Default: the crate version.
    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

fn default_server_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// HTTP binding configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Listen address. Default: "127.0.0.1"
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port; 0 picks a free port. Default: 8080
    #[serde(default = "default_port")]
    pub port: u16,

    /// The single JSON-RPC endpoint. Default: "/mcp"
    #[serde(default = "default_path")]
    pub path: String,

    /// Keep connections open across requests.
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Largest accepted request body in bytes. Default: 4 MiB
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            keep_alive: default_true(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl HttpConfig {
    /// `host:port` for binding or connecting.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_path() -> String {
    "/mcp".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// Client-side bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Connect timeout in milliseconds. Default: 5000
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Per request/response timeout in milliseconds. Default: 30000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ClientConfig {
    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request/response timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

const fn default_connect_timeout_ms() -> u64 {
    5_000
}

const fn default_request_timeout_ms() -> u64 {
    30_000
}

/// `logging` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when neither `RUST_LOG` nor `-v`/`-q` is given.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
