//! Server configuration.
//!
//! [`ServerConfig`] is a plain value handed to [`Server::new`](super::Server::new).
//! It can be built in code with the `with_*` methods or deserialized from JSON;
//! every field has a default, so a partial document is enough:
//!
//! ```
//! use switchyard::ServerConfig;
//!
//! let config = ServerConfig::from_json(r#"{ "bind_address": "127.0.0.1:0", "workers": 4 }"#).unwrap();
//! assert_eq!(config.workers, 4);
//! assert_eq!(config.max_request_bytes, 8 * 1024 * 1024);
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default body + head limit for a single request (8 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

/// Default time allowed for in-flight requests to finish after `stop`.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// Errors raised while loading or validating a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for the dispatcher.
///
/// Timeouts are in milliseconds; `None` disables the timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to listen on. Port `0` picks a free port.
    pub bind_address: String,
    /// Maximum number of connections processed concurrently.
    pub workers: usize,
    /// Largest request (head and body) accepted before answering `413`.
    pub max_request_bytes: usize,
    /// Per-read timeout while receiving a request; answered with `408`.
    pub read_timeout_ms: Option<u64>,
    /// Timeout for writing the response.
    pub write_timeout_ms: Option<u64>,
    /// How long `start` waits for in-flight requests after `stop`.
    pub drain_timeout_ms: u64,
    /// Free-form values for plugins.
    pub settings: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_owned(),
            workers: default_workers(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            read_timeout_ms: None,
            write_timeout_ms: None,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            settings: HashMap::new(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would make the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_request_bytes",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.bind_address.parse::<SocketAddr>().is_err()
            && self.bind_address.rsplit_once(':').is_none()
        {
            return Err(ConfigError::Invalid {
                field: "bind_address",
                reason: format!("{:?} is not a host:port pair", self.bind_address),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn with_max_request_bytes(mut self, bytes: usize) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = Some(millis(timeout));
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = Some(millis(timeout));
        self
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = millis(timeout);
        self
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert!(config.workers >= 1);
        assert_eq!(config.max_request_bytes, DEFAULT_MAX_REQUEST_BYTES);
        assert_eq!(config.read_timeout(), None);
        assert_eq!(config.drain_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = ServerConfig::from_json(
            r#"{ "read_timeout_ms": 250, "settings": { "greeting": "hi" } }"#,
        )
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.read_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.setting("greeting"), Some("hi"));
        assert_eq!(config.setting("missing"), None);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ServerConfig::from_json("{ workers: }"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_workers_is_invalid() {
        let err = ServerConfig::from_json(r#"{ "workers": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "workers", .. }));
    }

    #[test]
    fn bind_address_needs_a_port() {
        let config = ServerConfig::new().with_bind_address("localhost");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "bind_address", .. })
        ));
        assert!(ServerConfig::new().with_bind_address("localhost:0").validate().is_ok());
    }

    #[test]
    fn builder_round_trips_through_json() {
        let config = ServerConfig::new()
            .with_bind_address("127.0.0.1:0")
            .with_workers(2)
            .with_write_timeout(Duration::from_secs(1))
            .with_setting("mode", "test");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ServerConfig::from_json(&json).unwrap(), config);
    }
}
