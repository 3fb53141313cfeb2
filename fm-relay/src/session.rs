//! Per-connection protocol handling.
//!
//! Each connection runs one session task. Device sessions must register
//! before anything else; admin sessions may only issue routable commands.
//! Both perform their registry cleanup exactly once, from their terminal
//! transition.

use crate::channel::{Inbound, PeerChannel};
use crate::error::RouteError;
use crate::registry::DeviceMetadata;
use crate::server::RelayHub;
use fm_types::{
    decode_payload, AdminCommand, AdminInbound, DeviceId, DeviceInbound, ServerMessage,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Device session state machine states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Waiting for `device_register`.
    Unregistered,
    /// Admitted under `device_id`; further messages are forwarded to admins.
    Registered {
        /// The id the device was admitted under.
        device_id: DeviceId,
    },
    /// Connection finished.
    Closed,
}

/// A device connection.
pub struct DeviceSession<I> {
    hub: Arc<RelayHub>,
    inbound: I,
    channel: PeerChannel,
    ip: String,
    state: DeviceState,
}

impl<I: Inbound> DeviceSession<I> {
    /// Create a session for a freshly accepted device connection.
    pub fn new(hub: Arc<RelayHub>, inbound: I, channel: PeerChannel, ip: impl Into<String>) -> Self {
        Self {
            hub,
            inbound,
            channel,
            ip: ip.into(),
            state: DeviceState::Unregistered,
        }
    }

    /// Run the session until the connection ends.
    ///
    /// Returns the final state, which is always [`DeviceState::Closed`].
    pub async fn run(mut self) -> DeviceState {
        if let Some(device_id) = self.await_registration().await {
            self.state = DeviceState::Registered { device_id };
            self.relay().await;
        }
        self.close().await
    }

    /// Wait for the registration message and admit the device.
    async fn await_registration(&mut self) -> Option<DeviceId> {
        let first = match self.hub.config().limits.register_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, self.inbound.receive()).await {
                Ok(frame) => frame,
                Err(_) => {
                    tracing::warn!(
                        ip = %self.ip,
                        "Registration timeout ({}s)",
                        timeout.as_secs()
                    );
                    return None;
                }
            },
            None => self.inbound.receive().await,
        };

        let Ok(first) = first else {
            tracing::debug!(ip = %self.ip, "Connection closed before registration");
            return None;
        };

        let register = match DeviceInbound::decode(&first) {
            Ok(DeviceInbound::Register(register)) => register,
            Ok(DeviceInbound::Message(_)) => {
                tracing::warn!(ip = %self.ip, "First message was not a registration");
                return None;
            }
            Err(e) => {
                tracing::warn!(ip = %self.ip, "Invalid registration: {}", e);
                self.hub
                    .metrics()
                    .malformed_messages_total
                    .fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        let device_id = register.requested_id().unwrap_or_else(DeviceId::generate);
        let metadata = DeviceMetadata::from_register(&register, self.ip.clone());

        self.hub
            .registry()
            .admit_device(device_id.clone(), metadata, self.channel.clone())
            .await;
        self.hub
            .metrics()
            .devices_registered_total
            .fetch_add(1, Ordering::Relaxed);

        // The device counts as registered from here on, even if the
        // confirmation is lost; cleanup must still release it.
        if let Err(e) = self.channel.send(&ServerMessage::Registered {
            device_id: device_id.clone(),
        }) {
            tracing::debug!(device_id = %device_id, "Failed to confirm registration: {}", e);
            self.state = DeviceState::Registered { device_id };
            return None;
        }

        Some(device_id)
    }

    /// Forward every further message to the admins, repeated registrations
    /// included.
    async fn relay(&mut self) {
        let DeviceState::Registered { device_id } = &self.state else {
            return;
        };

        while let Ok(text) = self.inbound.receive().await {
            match decode_payload(&text) {
                Ok(payload) => {
                    let delivered = self.hub.registry().forward_to_admins(device_id, payload).await;
                    self.hub
                        .metrics()
                        .messages_forwarded_total
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(device_id = %device_id, admins = delivered, "Forwarded device message");
                }
                Err(e) => {
                    tracing::debug!(device_id = %device_id, "Dropping malformed message: {}", e);
                    self.hub
                        .metrics()
                        .malformed_messages_total
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Terminal transition: release the device if it was admitted, close the
    /// connection.
    async fn close(mut self) -> DeviceState {
        if let DeviceState::Registered { device_id } =
            std::mem::replace(&mut self.state, DeviceState::Closed)
        {
            self.hub
                .registry()
                .release_device(&device_id, self.channel.id())
                .await;
        }
        self.channel.close();
        self.state
    }
}

/// An admin connection.
pub struct AdminSession<I> {
    inbound: I,
    handler: AdminHandler,
}

/// The parts of an admin session shared across awaits.
struct AdminHandler {
    hub: Arc<RelayHub>,
    channel: PeerChannel,
}

impl<I: Inbound> AdminSession<I> {
    /// Create a session for a freshly accepted admin connection.
    pub fn new(hub: Arc<RelayHub>, inbound: I, channel: PeerChannel) -> Self {
        Self {
            inbound,
            handler: AdminHandler { hub, channel },
        }
    }

    /// Run the session until the connection ends.
    pub async fn run(mut self) {
        let AdminHandler { hub, channel } = &self.handler;
        let peer = channel.id();
        hub.registry().admit_admin(channel.clone()).await;
        hub.metrics()
            .admin_connections_total
            .fetch_add(1, Ordering::Relaxed);
        tracing::info!(peer, "Admin connected");

        while let Ok(text) = self.inbound.receive().await {
            self.handler.handle_message(&text).await;
        }

        let AdminHandler { hub, channel } = &self.handler;
        hub.registry().remove_admin(peer).await;
        channel.close();
        tracing::info!(peer, "Admin disconnected");
    }
}

impl AdminHandler {
    async fn handle_message(&self, text: &str) {
        match AdminInbound::decode(text) {
            Ok(AdminInbound::Command(command)) => self.route(command).await,
            Ok(AdminInbound::Unrecognized { kind }) => {
                tracing::debug!(peer = self.channel.id(), kind = %kind, "Ignoring unroutable admin message");
            }
            Err(e) => {
                tracing::debug!(peer = self.channel.id(), "Dropping malformed admin message: {}", e);
                self.hub
                    .metrics()
                    .malformed_messages_total
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Route a command; tell this admin if the device is unreachable.
    async fn route(&self, command: AdminCommand) {
        let result = match &command.device_id {
            Some(device_id) => {
                self.hub
                    .registry()
                    .route_to_device(device_id, &command.payload)
                    .await
            }
            None => Err(RouteError::NotConnected(None)),
        };

        match result {
            Ok(()) => {
                self.hub
                    .metrics()
                    .commands_routed_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    peer = self.channel.id(),
                    command = command.kind.as_str(),
                    "Routed command"
                );
            }
            Err(e) => {
                self.hub
                    .metrics()
                    .commands_rejected_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(peer = self.channel.id(), "Command rejected: {}", e);
                let reply = ServerMessage::Error {
                    message: e.to_string(),
                };
                if let Err(e) = self.channel.send(&reply) {
                    tracing::debug!(peer = self.channel.id(), "Failed to send error reply: {}", e);
                }
            }
        }
    }
}
