//! Configuration loading for the relay hub.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Connection limits.
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
    /// Offline device retention.
    pub retention: RetentionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8000).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// WebSocket upgrade attempts allowed per source IP per minute (default: 60).
    #[serde(default = "default_connections_per_ip")]
    pub connections_per_ip: u32,
    /// Seconds a device has to send its registration; 0 waits indefinitely
    /// (default: 10).
    #[serde(default = "default_register_timeout_secs")]
    pub register_timeout_secs: u64,
    /// Largest accepted WebSocket message in bytes (default: 64MB).
    /// Uploads travel base64-encoded inside a single message.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Enable metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

/// Offline device retention.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Forget offline devices after this many seconds; 0 keeps them until
    /// restart (default: 0).
    #[serde(default)]
    pub offline_ttl_secs: u64,
    /// How often the retention task runs, in seconds (default: 3600).
    #[serde(default = "default_retention_interval")]
    pub interval_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_connections_per_ip() -> u32 {
    60
}

fn default_register_timeout_secs() -> u64 {
    10
}

fn default_max_message_bytes() -> usize {
    64 * 1024 * 1024 // 64MB
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_retention_interval() -> u64 {
    3600 // 1 hour
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: default_connections_per_ip(),
            register_timeout_secs: default_register_timeout_secs(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            offline_ttl_secs: 0,
            interval_secs: default_retention_interval(),
        }
    }
}

impl LimitsConfig {
    /// Registration deadline, or `None` when disabled.
    pub fn register_timeout(&self) -> Option<Duration> {
        (self.register_timeout_secs > 0).then(|| Duration::from_secs(self.register_timeout_secs))
    }
}

impl RetentionConfig {
    /// Maximum age of an offline entry, or `None` when pruning is disabled.
    pub fn offline_ttl(&self) -> Option<Duration> {
        (self.offline_ttl_secs > 0).then(|| Duration::from_secs(self.offline_ttl_secs))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
