//! Prometheus metrics endpoint.

use crate::server::RelayHub;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges reflect the registry right now; counters are monotonic since startup.
pub async fn metrics_handler(Extension(hub): Extension<Arc<RelayHub>>) -> impl IntoResponse {
    let m = hub.metrics();
    let stats = hub.registry().stats().await;

    let devices_online = stats.devices_online;
    let devices_known = stats.devices_known;
    let admins = stats.admins;
    let tracked_ips = hub.rate_limits().connection_keys_count();

    let registered = m.devices_registered_total.load(Ordering::Relaxed);
    let admin_conns = m.admin_connections_total.load(Ordering::Relaxed);
    let routed = m.commands_routed_total.load(Ordering::Relaxed);
    let rejected = m.commands_rejected_total.load(Ordering::Relaxed);
    let forwarded = m.messages_forwarded_total.load(Ordering::Relaxed);
    let rate_limits = m.rate_limit_hits.load(Ordering::Relaxed);
    let malformed = m.malformed_messages_total.load(Ordering::Relaxed);

    let body = format!(
        r#"# HELP remotefm_relay_devices_online Devices with a live connection
# TYPE remotefm_relay_devices_online gauge
remotefm_relay_devices_online {devices_online}

# HELP remotefm_relay_devices_known Devices known since startup (online or offline)
# TYPE remotefm_relay_devices_known gauge
remotefm_relay_devices_known {devices_known}

# HELP remotefm_relay_admins_connected Connected admin sessions
# TYPE remotefm_relay_admins_connected gauge
remotefm_relay_admins_connected {admins}

# HELP remotefm_relay_rate_limit_tracked_ips Source IPs tracked by the connection limiter
# TYPE remotefm_relay_rate_limit_tracked_ips gauge
remotefm_relay_rate_limit_tracked_ips {tracked_ips}

# HELP remotefm_relay_info Server information
# TYPE remotefm_relay_info gauge
remotefm_relay_info{{version="{version}"}} 1

# HELP remotefm_relay_devices_registered_total Device registrations accepted
# TYPE remotefm_relay_devices_registered_total counter
remotefm_relay_devices_registered_total {registered}

# HELP remotefm_relay_admin_connections_total Admin connections accepted
# TYPE remotefm_relay_admin_connections_total counter
remotefm_relay_admin_connections_total {admin_conns}

# HELP remotefm_relay_commands_routed_total Admin commands delivered to a device
# TYPE remotefm_relay_commands_routed_total counter
remotefm_relay_commands_routed_total {routed}

# HELP remotefm_relay_commands_rejected_total Admin commands for unreachable devices
# TYPE remotefm_relay_commands_rejected_total counter
remotefm_relay_commands_rejected_total {rejected}

# HELP remotefm_relay_messages_forwarded_total Device messages forwarded to admins
# TYPE remotefm_relay_messages_forwarded_total counter
remotefm_relay_messages_forwarded_total {forwarded}

# HELP remotefm_relay_rate_limit_hits_total Connection attempts refused by rate limiting
# TYPE remotefm_relay_rate_limit_hits_total counter
remotefm_relay_rate_limit_hits_total {rate_limits}

# HELP remotefm_relay_malformed_messages_total Frames dropped as undecodable
# TYPE remotefm_relay_malformed_messages_total counter
remotefm_relay_malformed_messages_total {malformed}
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
