#![deny(unsafe_code)]

//! Configuration loading and validation for localsock.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! top-level structure; [`TransportConfig`] says where the daemon listens and
//! how connections to it behave.
//!
//! ## TOML Example
//!
//! ```toml
//! [transport]
//! address = "/var/run/docker.sock"
//! connect_timeout_ms = 0
//! keep_alive = true
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default daemon socket on POSIX systems.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Default daemon pipe on Windows.
pub const DEFAULT_PIPE_NAME: &str = r"\\.\pipe\docker_engine";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local channel transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the daemon listens and how connections to it behave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Socket path (POSIX) or pipe name (Windows).
    #[serde(default = "default_address")]
    pub address: String,

    /// Connect deadline in milliseconds. 0 waits indefinitely.
    #[serde(default)]
    pub connect_timeout_ms: u64,

    /// Keep the connection open between requests.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            connect_timeout_ms: 0,
            keep_alive: default_keep_alive(),
        }
    }
}

impl TransportConfig {
    /// The connect deadline, or `None` when unbounded.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }
}

fn default_address() -> String {
    if cfg!(windows) {
        DEFAULT_PIPE_NAME.to_string()
    } else {
        DEFAULT_SOCKET_PATH.to_string()
    }
}

fn default_keep_alive() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
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
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration");
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let address = self.transport.address.trim();
        if address.is_empty() {
            return Err(ConfigError::Validation(
                "transport.address must not be empty".to_string(),
            ));
        }
        if cfg!(windows) && !address.starts_with(r"\\") {
            return Err(ConfigError::Validation(format!(
                "transport.address must be a pipe name like {DEFAULT_PIPE_NAME:?}, got {address:?}"
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.transport.connect_timeout_ms, 0);
        assert_eq!(config.transport.connect_timeout(), None);
        assert!(config.transport.keep_alive);
        assert_eq!(config.logging.level, "info");
        if cfg!(unix) {
            assert_eq!(config.transport.address, DEFAULT_SOCKET_PATH);
        }
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.transport.keep_alive);
        assert_eq!(config.logging.level, "info");
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [transport]
            address = "/run/user/1000/docker.sock"
            connect_timeout_ms = 1500
            keep_alive = false

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.transport.address, "/run/user/1000/docker.sock");
        assert_eq!(
            config.transport.connect_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert!(!config.transport.keep_alive);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_empty_address() {
        let toml = r#"
            [transport]
            address = "  "
        "#;
        let result = AppConfig::parse(toml);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [logging]
            level = "chatty"
        "#;
        let result = AppConfig::parse(toml);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_wrong_types() {
        let toml = r#"
            [transport]
            connect_timeout_ms = "soon"
        "#;
        assert!(matches!(AppConfig::parse(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("keep_alive"));
        let parsed = AppConfig::parse(&text).unwrap();
        assert_eq!(parsed.transport.address, config.transport.address);
    }

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("localsock.toml");
        tokio::fs::write(&path, "[logging]\nlevel = \"warn\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test_log::test(tokio::test)]
    async fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = AppConfig::load(&dir.path().join("absent.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
