//! Peer channels: the hub's handle on one duplex connection.
//!
//! The outbound half is a cheap, cloneable [`PeerChannel`] backed by an
//! unbounded queue. A per-connection writer task drains the queue onto the
//! transport, so enqueueing never suspends and may happen while the registry
//! lock is held. Once the writer is gone every send fails with
//! [`ChannelError::Closed`], which the registry treats as a disconnect.
//!
//! The inbound half is the [`Inbound`] trait, implemented for the WebSocket
//! read half and for in-memory queues.

use crate::error::{ChannelClosed, ChannelError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;

/// Process-unique identity of a connection.
pub type PeerId = u64;

/// Frames queued for a connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// A serialized JSON message.
    Text(String),
    /// Close the connection after everything queued before it.
    Close,
}

/// Receiving end of a [`PeerChannel`], owned by the writer task.
pub type Outbox = mpsc::UnboundedReceiver<Outgoing>;

/// Outbound handle for one peer.
#[derive(Clone)]
pub struct PeerChannel {
    id: PeerId,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl PeerChannel {
    /// Create a channel and the outbox its writer drains.
    pub fn new(id: PeerId) -> (Self, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    /// Identity of the underlying connection.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Serialize and queue a message.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), ChannelError> {
        let text = serde_json::to_string(message)?;
        self.send_text(text)
    }

    /// Queue an already serialized message.
    pub fn send_text(&self, text: String) -> Result<(), ChannelError> {
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|_| ChannelError::Closed)
    }

    /// Ask the writer to close the connection. No-op if it is already gone.
    pub fn close(&self) {
        let _ = self.tx.send(Outgoing::Close);
    }

    /// Whether the writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for PeerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerChannel")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Inbound half of a peer connection.
#[async_trait]
pub trait Inbound: Send {
    /// Wait for the next text message.
    ///
    /// Returns [`ChannelClosed`] once the peer has gone; callers treat that as
    /// terminal.
    async fn receive(&mut self) -> Result<String, ChannelClosed>;
}

#[async_trait]
impl Inbound for mpsc::UnboundedReceiver<String> {
    async fn receive(&mut self) -> Result<String, ChannelClosed> {
        self.recv().await.ok_or(ChannelClosed)
    }
}
