//! # remotefm-relay
//!
//! Relay hub for the Remote File Manager.
//!
//! This crate implements a hub that:
//! - Accepts WebSocket connections from devices and from admin panels
//! - Tracks which devices are online and keeps offline ones for history
//! - Routes admin commands to exactly one addressed device
//! - Forwards device responses to every admin, stamped with the device id
//! - Never interprets file contents or paths (the hub is a "dumb pipe")
//!
//! ## Architecture
//!
//! ```text
//! Admin A ──┐                              ┌── Device 1
//!           │   /ws/admin      /ws/device  │
//! Admin B ──┼──────────►┌──────────┐◄──────┼── Device 2
//!           │           │ Registry │       │
//!           │           └──────────┘       └── Device 3
//! ```
//!
//! ## Protocol
//!
//! JSON objects with a `type` field:
//! - device_register → registered (device handshake)
//! - list_files, download_file, ... (admin → device, routed verbatim)
//! - connections_update (hub → admins, on every presence change)
//! - error (hub → admin, when the addressed device is not connected)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod http;
pub mod limits;
pub mod registry;
pub mod retention;
pub mod server;
pub mod session;
