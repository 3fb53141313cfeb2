//! # remotefm-types
//!
//! Wire format types for the Remote File Manager relay hub.
//!
//! Both peer classes speak JSON objects with a `type` discriminator:
//! - [`DeviceInbound`] - what a device may send (registration, then opaque payloads)
//! - [`AdminInbound`] - what an admin may send (routable commands)
//! - [`ServerMessage`] - what the hub itself originates
//! - [`DeviceSummary`] - one row of a `connections_update` snapshot

#![warn(missing_docs)]
#![warn(clippy::all)]

mod device;
mod error;
mod ids;
mod messages;

pub use device::{DeviceStatus, DeviceSummary};
pub use error::MessageError;
pub use ids::DeviceId;
pub use messages::{
    decode_payload, AdminCommand, AdminInbound, CommandKind, DeviceInbound, DeviceRegister,
    Payload, ServerMessage,
};
