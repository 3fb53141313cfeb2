//! WebSocket endpoints for devices and admins.
//!
//! Each upgraded socket is split: the read half becomes the session's
//! [`Inbound`], the write half is owned by a writer task draining the
//! connection's [`PeerChannel`].

use crate::channel::{Inbound, Outbox, Outgoing, PeerChannel};
use crate::error::ChannelClosed;
use crate::server::RelayHub;
use crate::session::{AdminSession, DeviceSession};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long a finished session waits for its writer to flush.
const WRITER_DRAIN: Duration = Duration::from_secs(5);

/// GET /ws/device
pub async fn device_ws_handler(
    Extension(hub): Extension<Arc<RelayHub>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(rejection) = check_rate_limit(&hub, addr) {
        return rejection;
    }
    limit_message_size(ws, &hub).on_upgrade(move |socket| serve_device(socket, hub, addr))
}

/// GET /ws/admin
pub async fn admin_ws_handler(
    Extension(hub): Extension<Arc<RelayHub>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(rejection) = check_rate_limit(&hub, addr) {
        return rejection;
    }
    limit_message_size(ws, &hub).on_upgrade(move |socket| serve_admin(socket, hub, addr))
}

fn check_rate_limit(hub: &RelayHub, addr: SocketAddr) -> Option<Response> {
    let Err(e) = hub.rate_limits().check_connection(&addr.ip()) else {
        return None;
    };
    tracing::warn!(peer = %addr, "Connection rate limited: {}", e);
    hub.metrics().rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    Some((StatusCode::TOO_MANY_REQUESTS, e.to_string()).into_response())
}

fn limit_message_size(ws: WebSocketUpgrade, hub: &RelayHub) -> WebSocketUpgrade {
    let max = hub.config().limits.max_message_bytes;
    ws.max_message_size(max).max_frame_size(max)
}

async fn serve_device(socket: WebSocket, hub: Arc<RelayHub>, addr: SocketAddr) {
    tracing::debug!(peer = %addr, "Device socket opened");
    let (channel, inbound, writer) = open(socket, &hub, addr);
    DeviceSession::new(hub, inbound, channel, addr.ip().to_string())
        .run()
        .await;
    finish(writer).await;
}

async fn serve_admin(socket: WebSocket, hub: Arc<RelayHub>, addr: SocketAddr) {
    tracing::debug!(peer = %addr, "Admin socket opened");
    let (channel, inbound, writer) = open(socket, &hub, addr);
    AdminSession::new(hub, inbound, channel).run().await;
    finish(writer).await;
}

fn open(
    socket: WebSocket,
    hub: &RelayHub,
    addr: SocketAddr,
) -> (PeerChannel, WsInbound, JoinHandle<()>) {
    let (sink, stream) = socket.split();
    let (channel, outbox) = PeerChannel::new(hub.registry().next_peer_id());
    let writer = tokio::spawn(write_loop(sink, outbox, addr));
    (channel, WsInbound { stream, addr }, writer)
}

/// Give the writer a moment to flush queued frames and the close frame.
async fn finish(mut writer: JoinHandle<()>) {
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Drain the outbox onto the socket until closed or the socket fails.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut outbox: Outbox, addr: SocketAddr) {
    while let Some(frame) = outbox.recv().await {
        match frame {
            Outgoing::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::debug!(peer = %addr, "WS write failed: {}", e);
                    return;
                }
            }
            Outgoing::Close => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

/// Read half of a WebSocket as an [`Inbound`].
pub struct WsInbound {
    stream: SplitStream<WebSocket>,
    addr: SocketAddr,
}

#[async_trait]
impl Inbound for WsInbound {
    async fn receive(&mut self) -> Result<String, ChannelClosed> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!(peer = %self.addr, "Ignoring binary frame");
                }
                // Pings are answered by axum.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Err(ChannelClosed),
                Some(Err(e)) => {
                    tracing::debug!(peer = %self.addr, "WS error: {}", e);
                    return Err(ChannelClosed);
                }
            }
        }
    }
}
