//! Main RelayHub coordination.
//!
//! RelayHub owns the configuration, the registry, rate limiters and metrics,
//! and is shared by every connection task behind an `Arc`.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::limits::RateLimits;
use crate::registry::Registry;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Successful device registrations.
    pub devices_registered_total: AtomicU64,
    /// Admin connections accepted.
    pub admin_connections_total: AtomicU64,
    /// Commands delivered to a device.
    pub commands_routed_total: AtomicU64,
    /// Commands answered with a not-connected error.
    pub commands_rejected_total: AtomicU64,
    /// Device messages forwarded to admins.
    pub messages_forwarded_total: AtomicU64,
    /// Upgrade attempts refused by the rate limiter.
    pub rate_limit_hits: AtomicU64,
    /// Frames dropped because they could not be decoded.
    pub malformed_messages_total: AtomicU64,
}

/// Main relay hub.
pub struct RelayHub {
    config: Config,
    registry: Registry,
    rate_limits: RateLimits,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for RelayHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHub")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl RelayHub {
    /// Create a hub with an empty registry.
    pub fn new(config: Config) -> Self {
        let rate_limits = RateLimits::new(&config.limits);
        Self {
            config,
            registry: Registry::new(),
            rate_limits,
            metrics: RelayMetrics::default(),
        }
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the device/admin registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }
}

/// Load `path` (defaults if missing) and apply a bind address override.
pub fn load_config(path: &Path, bind: Option<String>) -> Result<Config> {
    let mut config = Config::load_or_default(path)?;
    if let Some(bind) = bind {
        config.server.bind_address = bind;
    }
    Ok(config)
}

/// Bind the configured address and serve until the listener fails.
pub async fn run(config: Config) -> Result<()> {
    let address = config.server.bind_address.clone();
    let addr: SocketAddr = address
        .parse()
        .map_err(|source| RelayError::BindAddress { address, source })?;

    let hub = Arc::new(RelayHub::new(config));
    crate::http::health::init_start_time();
    let _retention = crate::retention::spawn_retention_task(hub.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay listening on {}", listener.local_addr()?);
    tracing::info!("Device WS: ws://{}/ws/device", addr);
    tracing::info!("Admin WS:  ws://{}/ws/admin", addr);

    crate::http::serve(listener, hub).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hub_starts_empty() {
        let hub = RelayHub::new(Config::default());
        let stats = hub.registry().stats().await;
        assert_eq!(stats.devices_known, 0);
        assert_eq!(stats.admins, 0);
        assert_eq!(hub.config().server.bind_address, "0.0.0.0:8000");
    }

    #[tokio::test]
    async fn run_rejects_bad_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "not-an-address".to_string();

        let err = run(config).await.unwrap_err();
        assert!(matches!(err, RelayError::BindAddress { .. }));
    }

    #[test]
    fn load_config_wraps_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[server\nbind_address = 1").unwrap();

        let err = load_config(file.path(), None).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn load_config_applies_bind_override() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("relay.toml");

        let config = load_config(&missing, Some("127.0.0.1:9100".to_string())).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9100");
        assert_eq!(config.limits.connections_per_ip, 60);
    }

    #[test]
    fn hub_is_debug() {
        let hub = RelayHub::new(Config::default());
        assert!(format!("{:?}", hub).contains("RelayHub"));
    }
}
