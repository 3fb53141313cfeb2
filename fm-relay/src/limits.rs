//! Rate limiting for WebSocket upgrades.
//!
//! Devices and admins connect directly, so the source IP is a usable key.
//! Attempts are counted per IP with governor's keyed limiter backed by DashMap.

use crate::config::LimitsConfig;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Rate limiters for the relay hub.
#[derive(Clone)]
pub struct RateLimits {
    /// Upgrade attempts per source IP; `None` when `connections_per_ip` is 0.
    connection_limiter: Option<Arc<KeyedLimiter<IpAddr>>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &self.connection_limiter.as_ref().map(|_| "KeyedLimiter<IpAddr>"))
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// A `connections_per_ip` of 0 disables connection limiting.
    pub fn new(config: &LimitsConfig) -> Self {
        let connection_limiter = NonZeroU32::new(config.connections_per_ip)
            .map(|per_minute| Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))));

        Self { connection_limiter }
    }

    /// Check if a connection attempt from `ip` is allowed.
    pub fn check_connection(&self, ip: &IpAddr) -> Result<(), RateLimitError> {
        match &self.connection_limiter {
            Some(limiter) => limiter
                .check_key(ip)
                .map_err(|_| RateLimitError::ConnectionLimitExceeded),
            None => Ok(()),
        }
    }

    /// Number of tracked IPs (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter
            .as_ref()
            .map(|limiter| limiter.len())
            .unwrap_or(0)
    }

    /// Evict IPs whose quota has fully recharged. Called from the retention task.
    pub fn shrink(&self) {
        if let Some(limiter) = &self.connection_limiter {
            limiter.retain_recent();
        }
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many connection attempts from this IP.
    ConnectionLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLimitExceeded => write!(f, "connection rate limit exceeded"),
        }
    }
}

impl std::error::Error for RateLimitError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(connections_per_ip: u32) -> LimitsConfig {
        LimitsConfig {
            connections_per_ip,
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn connection_limit_allows_within_quota() {
        let limits = RateLimits::new(&config(5));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();

        for _ in 0..5 {
            assert!(limits.check_connection(&ip).is_ok());
        }
        assert_eq!(
            limits.check_connection(&ip),
            Err(RateLimitError::ConnectionLimitExceeded)
        );
    }

    #[test]
    fn different_ips_have_independent_limits() {
        let limits = RateLimits::new(&config(1));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limits.check_connection(&a).is_ok());
        assert!(limits.check_connection(&a).is_err());
        assert!(limits.check_connection(&b).is_ok());
        assert_eq!(limits.connection_keys_count(), 2);
    }

    #[test]
    fn zero_disables_limiting() {
        let limits = RateLimits::new(&config(0));
        let ip: IpAddr = "::1".parse().unwrap();

        for _ in 0..1000 {
            assert!(limits.check_connection(&ip).is_ok());
        }
        assert_eq!(limits.connection_keys_count(), 0);
        limits.shrink();
    }

    #[test]
    fn rate_limit_error_display() {
        assert_eq!(
            RateLimitError::ConnectionLimitExceeded.to_string(),
            "connection rate limit exceeded"
        );
    }
}
