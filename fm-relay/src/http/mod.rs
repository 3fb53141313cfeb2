//! HTTP endpoints for the relay hub.
//!
//! Provides the two WebSocket endpoints, the device list, health checks and
//! metrics.

pub mod health;
mod metrics;
pub mod ws;

use crate::error::Result;
use crate::server::RelayHub;
use axum::{routing::get, Extension, Json, Router};
use fm_types::DeviceSummary;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(hub: Arc<RelayHub>) -> Router {
    let mut router = Router::new()
        .route("/ws/device", get(ws::device_ws_handler))
        .route("/ws/admin", get(ws::admin_ws_handler))
        .route("/api/devices", get(devices_handler))
        .route("/health", get(health::health_handler));

    if hub.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(hub))
}

/// Serve the router on an already bound listener.
///
/// Peer addresses are made available to the WebSocket handlers.
pub async fn serve(listener: tokio::net::TcpListener, hub: Arc<RelayHub>) -> Result<()> {
    let app = build_router(hub);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Device list response.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceList {
    /// Every known device.
    pub devices: Vec<DeviceSummary>,
}

/// GET /api/devices
async fn devices_handler(Extension(hub): Extension<Arc<RelayHub>>) -> Json<DeviceList> {
    Json(DeviceList {
        devices: hub.registry().snapshot().await,
    })
}
