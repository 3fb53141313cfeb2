//! Error types for the relay hub.

use fm_types::DeviceId;

/// Main error type for relay startup and serving.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Invalid bind address.
    #[error("invalid bind address {address}: {source}")]
    BindAddress {
        /// The address as configured.
        address: String,
        /// Underlying parse error.
        source: std::net::AddrParseError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to route an admin command to a device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The addressed device has no live connection.
    ///
    /// `None` when the command did not name a device at all.
    #[error("Device {} not connected", display_target(.0))]
    NotConnected(Option<DeviceId>),
}

fn display_target(target: &Option<DeviceId>) -> &str {
    target.as_ref().map(DeviceId::as_str).unwrap_or("unknown")
}

/// Outbound delivery failure on a peer channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The connection's writer is gone; the peer is disconnected.
    #[error("channel closed")]
    Closed,

    /// Message serialization failed.
    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The inbound half reached end of stream or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("channel closed")]
pub struct ChannelClosed;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_names_device() {
        let err = RouteError::NotConnected(Some(DeviceId::from("dev2")));
        assert_eq!(err.to_string(), "Device dev2 not connected");
    }

    #[test]
    fn not_connected_without_device() {
        assert_eq!(
            RouteError::NotConnected(None).to_string(),
            "Device unknown not connected"
        );
    }
}
