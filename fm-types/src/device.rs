//! Device presence as reported to admins.

use serde::{Deserialize, Serialize};

use crate::DeviceId;

/// Whether a known device currently holds a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Connected and routable.
    Online,
    /// Known from an earlier registration, not routable.
    Offline,
}

/// One entry of a `connections_update` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Device identifier.
    pub id: DeviceId,
    /// Source address of the registering connection.
    pub ip: String,
    /// Human-readable device name.
    pub device_name: String,
    /// OS release string reported by the device.
    pub android_version: String,
    /// Local registration time, `YYYY-MM-DD HH:MM:SS`.
    pub connected_at: String,
    /// Current presence.
    pub status: DeviceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DeviceStatus::Online).unwrap(), "\"online\"");
        assert_eq!(serde_json::to_string(&DeviceStatus::Offline).unwrap(), "\"offline\"");
    }

    #[test]
    fn summary_field_names() {
        let summary = DeviceSummary {
            id: DeviceId::from("dev1"),
            ip: "10.0.0.2".to_string(),
            device_name: "Pixel".to_string(),
            android_version: "14".to_string(),
            connected_at: "2024-01-01 12:00:00".to_string(),
            status: DeviceStatus::Online,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["id"], "dev1");
        assert_eq!(value["device_name"], "Pixel");
        assert_eq!(value["status"], "online");
    }
}
