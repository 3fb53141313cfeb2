//! Device and admin registry.
//!
//! The single source of truth for which devices and admins are live. All state
//! sits behind one mutex; every operation completes under the lock without
//! awaiting I/O (outbound sends only enqueue), so snapshot broadcasts reach
//! each admin in the order the mutations happened.

use crate::channel::{PeerChannel, PeerId};
use crate::error::RouteError;
use chrono::{DateTime, Local};
use fm_types::{DeviceId, DeviceRegister, DeviceStatus, DeviceSummary, Payload, ServerMessage};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Timestamp format used in snapshots.
const CONNECTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What a device told us about itself, plus where it connected from.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceMetadata {
    /// Human-readable name.
    pub device_name: String,
    /// OS release.
    pub android_version: String,
    /// OS API level.
    pub sdk_version: String,
    /// Source address of the connection.
    pub ip: String,
    /// Opaque credential; stored, never validated or echoed.
    pub api_key: String,
}

impl DeviceMetadata {
    /// Build metadata from a registration, filling the usual defaults.
    pub fn from_register(register: &DeviceRegister, ip: impl Into<String>) -> Self {
        Self {
            device_name: register
                .device_name
                .clone()
                .unwrap_or_else(|| "Unknown Device".to_string()),
            android_version: register
                .android_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            sdk_version: register
                .sdk_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            ip: ip.into(),
            api_key: register.api_key.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Debug for DeviceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMetadata")
            .field("device_name", &self.device_name)
            .field("android_version", &self.android_version)
            .field("sdk_version", &self.sdk_version)
            .field("ip", &self.ip)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug)]
struct DeviceRecord {
    metadata: DeviceMetadata,
    connected_at: DateTime<Local>,
    status: DeviceStatus,
    /// Set when the device went offline; drives retention pruning.
    offline_since: Option<Instant>,
}

impl DeviceRecord {
    fn summary(&self, id: &DeviceId) -> DeviceSummary {
        DeviceSummary {
            id: id.clone(),
            ip: self.metadata.ip.clone(),
            device_name: self.metadata.device_name.clone(),
            android_version: self.metadata.android_version.clone(),
            connected_at: self.connected_at.format(CONNECTED_AT_FORMAT).to_string(),
            status: self.status,
        }
    }
}

/// Point-in-time counts for health and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Devices with a live channel.
    pub devices_online: usize,
    /// Devices known, online or offline.
    pub devices_known: usize,
    /// Connected admins.
    pub admins: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Every device seen since startup, ordered by id.
    devices: BTreeMap<DeviceId, DeviceRecord>,
    /// Live channel per online device.
    live: HashMap<DeviceId, PeerChannel>,
    /// Connected admins.
    admins: HashMap<PeerId, PeerChannel>,
}

impl RegistryState {
    fn snapshot(&self) -> Vec<DeviceSummary> {
        self.devices
            .iter()
            .map(|(id, record)| record.summary(id))
            .collect()
    }

    fn snapshot_message(&self) -> ServerMessage {
        ServerMessage::ConnectionsUpdate {
            connections: self.snapshot(),
        }
    }

    /// Send the current snapshot to every admin.
    fn broadcast_snapshot(&mut self) {
        match serde_json::to_string(&self.snapshot_message()) {
            Ok(text) => {
                self.fan_out(&text);
            }
            Err(e) => tracing::error!("Failed to serialize snapshot: {}", e),
        }
    }

    /// Deliver `text` to every admin, dropping admins whose channel is gone.
    ///
    /// Returns how many admins it reached.
    fn fan_out(&mut self, text: &str) -> usize {
        let mut delivered = 0;
        self.admins.retain(|peer, channel| {
            match channel.send_text(text.to_string()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(e) => {
                    tracing::debug!(peer = *peer, "Dropping admin: {}", e);
                    false
                }
            }
        });
        delivered
    }

    /// Take a device's live channel and mark it offline.
    ///
    /// With `owner` set, only a channel belonging to that connection is taken.
    /// Returns whether anything changed.
    fn detach(&mut self, device_id: &DeviceId, owner: Option<PeerId>) -> bool {
        let owned = match self.live.get(device_id) {
            Some(channel) => owner.map_or(true, |peer| channel.id() == peer),
            None => false,
        };
        if !owned {
            return false;
        }

        self.live.remove(device_id);
        if let Some(record) = self.devices.get_mut(device_id) {
            record.status = DeviceStatus::Offline;
            record.offline_since = Some(Instant::now());
        }
        true
    }
}

/// Registry of live devices and admins.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    next_peer_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an identity for a new connection.
    pub fn next_peer_id(&self) -> PeerId {
        self.next_peer_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Admit a device, replacing any live channel and metadata under the same id.
    ///
    /// A replaced channel from a different connection is told to close.
    /// Every admin receives the new snapshot.
    pub async fn admit_device(
        &self,
        device_id: DeviceId,
        metadata: DeviceMetadata,
        channel: PeerChannel,
    ) {
        let mut state = self.state.lock().await;

        let peer = channel.id();
        if let Some(previous) = state.live.insert(device_id.clone(), channel) {
            if previous.id() != peer {
                tracing::info!(device_id = %device_id, "Device re-registered, closing previous connection");
                previous.close();
            }
        }

        tracing::info!(
            device_id = %device_id,
            ip = %metadata.ip,
            "Device connected: {}",
            metadata.device_name
        );

        state.devices.insert(
            device_id,
            DeviceRecord {
                metadata,
                connected_at: Local::now(),
                status: DeviceStatus::Online,
                offline_since: None,
            },
        );
        state.broadcast_snapshot();
    }

    /// Disconnect a device regardless of which connection holds it.
    ///
    /// No-op for ids without a live channel. Returns whether the device went
    /// offline (and a snapshot was broadcast).
    pub async fn remove_device(&self, device_id: &DeviceId) -> bool {
        self.detach_device(device_id, None).await
    }

    /// Disconnect a device only if `peer` still holds its live channel.
    ///
    /// Used by a connection tearing itself down, so that a connection that was
    /// superseded by a re-registration cannot take its replacement offline.
    pub async fn release_device(&self, device_id: &DeviceId, peer: PeerId) -> bool {
        self.detach_device(device_id, Some(peer)).await
    }

    async fn detach_device(&self, device_id: &DeviceId, owner: Option<PeerId>) -> bool {
        let mut state = self.state.lock().await;
        if !state.detach(device_id, owner) {
            return false;
        }
        tracing::info!(device_id = %device_id, "Device disconnected");
        state.broadcast_snapshot();
        true
    }

    /// Add an admin and send it the current snapshot.
    ///
    /// An admin whose channel is already dead is not added.
    pub async fn admit_admin(&self, channel: PeerChannel) {
        let mut state = self.state.lock().await;
        if let Err(e) = channel.send(&state.snapshot_message()) {
            tracing::debug!(peer = channel.id(), "Admin gone before snapshot: {}", e);
            return;
        }
        tracing::debug!(peer = channel.id(), admins = state.admins.len() + 1, "Admin added");
        state.admins.insert(channel.id(), channel);
    }

    /// Remove an admin. Idempotent.
    pub async fn remove_admin(&self, peer: PeerId) -> bool {
        self.state.lock().await.admins.remove(&peer).is_some()
    }

    /// Deliver a command to a device's live channel, unmodified.
    ///
    /// A failed send counts as the device disconnecting.
    pub async fn route_to_device(
        &self,
        device_id: &DeviceId,
        message: &Payload,
    ) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;

        let outcome = match state.live.get(device_id) {
            Some(channel) => channel.send(message).map_err(|e| (channel.id(), e)),
            None => return Err(RouteError::NotConnected(Some(device_id.clone()))),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err((peer, e)) => {
                tracing::warn!(device_id = %device_id, "Send to device failed: {}", e);
                if state.detach(device_id, Some(peer)) {
                    tracing::info!(device_id = %device_id, "Device disconnected");
                    state.broadcast_snapshot();
                }
                Err(RouteError::NotConnected(Some(device_id.clone())))
            }
        }
    }

    /// Stamp `device_id` onto a device message and deliver it to every admin.
    ///
    /// Admins whose channel is gone are dropped. Returns how many admins
    /// received the message.
    pub async fn forward_to_admins(&self, device_id: &DeviceId, mut message: Payload) -> usize {
        message.insert(
            "device_id".to_string(),
            Value::String(device_id.to_string()),
        );
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(device_id = %device_id, "Failed to serialize forward: {}", e);
                return 0;
            }
        };

        self.state.lock().await.fan_out(&text)
    }

    /// Current view of every known device, ordered by id.
    pub async fn snapshot(&self) -> Vec<DeviceSummary> {
        self.state.lock().await.snapshot()
    }

    /// Forget devices that have been offline for longer than `max_age`.
    ///
    /// Broadcasts a snapshot if anything was dropped. Returns the number dropped.
    pub async fn prune_offline(&self, max_age: Duration) -> usize {
        let mut state = self.state.lock().await;
        let before = state.devices.len();
        state.devices.retain(|_, record| match record.offline_since {
            Some(since) => since.elapsed() < max_age,
            None => true,
        });

        let pruned = before - state.devices.len();
        if pruned > 0 {
            state.broadcast_snapshot();
        }
        pruned
    }

    /// Whether a device currently has a live channel.
    pub async fn is_online(&self, device_id: &DeviceId) -> bool {
        self.state.lock().await.live.contains_key(device_id)
    }

    /// Point-in-time counts.
    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.lock().await;
        RegistryStats {
            devices_online: state.live.len(),
            devices_known: state.devices.len(),
            admins: state.admins.len(),
        }
    }
}
