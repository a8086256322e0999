//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use localsock_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .address(daemon.socket_path())
///     .connect_timeout_ms(500)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn address(mut self, address: impl AsRef<Path>) -> Self {
        self.config.transport.address = address.as_ref().to_string_lossy().into_owned();
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.transport.connect_timeout_ms = ms;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.config.transport.keep_alive = keep_alive;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
