//! `GET /health`: liveness plus registry counts.

use crate::registry::RegistryStats;
use crate::server::RelayHub;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record process start. Later calls keep the first instant.
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Time since [`init_start_time`]; zero if it was never called.
fn uptime() -> Duration {
    START_TIME
        .get()
        .map(Instant::elapsed)
        .unwrap_or_default()
}

/// Body of the health response.
///
/// Registry counts are flattened next to `status`, so a probe sees
/// `devices_online`, `devices_known` and `admins` at the top level.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Crate version.
    pub version: &'static str,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub registry: RegistryStats,
}

pub async fn health_handler(Extension(hub): Extension<Arc<RelayHub>>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime().as_secs(),
        registry: hub.registry().stats().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PeerChannel;
    use crate::config::Config;
    use crate::registry::DeviceMetadata;
    use fm_types::{DeviceId, DeviceRegister};
    use serde_json::json;

    #[tokio::test]
    async fn reports_registry_counts_at_top_level() {
        let hub = Arc::new(RelayHub::new(Config::default()));
        let registry = hub.registry();
        for id in ["a", "b"] {
            let (channel, _outbox) = PeerChannel::new(registry.next_peer_id());
            registry
                .admit_device(
                    DeviceId::from(id),
                    DeviceMetadata::from_register(&DeviceRegister::default(), "10.0.0.9"),
                    channel,
                )
                .await;
        }
        registry.remove_device(&DeviceId::from("b")).await;
        let (admin, _admin_outbox) = PeerChannel::new(registry.next_peer_id());
        registry.admit_admin(admin).await;

        let Json(body) = health_handler(Extension(hub)).await;
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["status"], "ok");
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(value["devices_online"], json!(1));
        assert_eq!(value["devices_known"], json!(2));
        assert_eq!(value["admins"], json!(1));
        assert!(value.get("registry").is_none());
    }
}
