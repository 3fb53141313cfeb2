//! Background retention task.
//!
//! Offline devices are kept for admins to see until restart. When
//! `retention.offline_ttl_secs` is set, this task forgets entries that have
//! been offline longer than that. It also evicts idle rate-limiter keys.

use crate::server::RelayHub;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Spawn the retention task.
///
/// Returns a handle that can be used to abort the task.
pub fn spawn_retention_task(hub: Arc<RelayHub>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval_secs = hub.config().retention.interval_secs.max(1);
        match hub.config().retention.offline_ttl() {
            Some(ttl) => tracing::info!(
                "Retention task started (interval: {}s, offline ttl: {}s)",
                interval_secs,
                ttl.as_secs()
            ),
            None => tracing::info!(
                "Retention task started (interval: {}s, offline devices kept until restart)",
                interval_secs
            ),
        }

        let mut timer = interval(Duration::from_secs(interval_secs));
        loop {
            timer.tick().await;
            run_retention_pass(&hub).await;
        }
    })
}

/// One retention pass. Returns the number of devices forgotten.
pub async fn run_retention_pass(hub: &RelayHub) -> usize {
    hub.rate_limits().shrink();

    let Some(ttl) = hub.config().retention.offline_ttl() else {
        return 0;
    };

    let pruned = hub.registry().prune_offline(ttl).await;
    if pruned > 0 {
        tracing::info!("Retention: forgot {} offline devices", pruned);
    } else {
        tracing::debug!("Retention: nothing to forget");
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PeerChannel;
    use crate::config::Config;
    use crate::registry::DeviceMetadata;
    use fm_types::{DeviceId, DeviceRegister};

    async fn hub_with_offline_device(offline_ttl_secs: u64) -> RelayHub {
        let mut config = Config::default();
        config.retention.offline_ttl_secs = offline_ttl_secs;
        let hub = RelayHub::new(config);

        let (channel, _outbox) = PeerChannel::new(hub.registry().next_peer_id());
        let id = DeviceId::from("dev1");
        hub.registry()
            .admit_device(
                id.clone(),
                DeviceMetadata::from_register(&DeviceRegister::default(), "127.0.0.1"),
                channel,
            )
            .await;
        hub.registry().remove_device(&id).await;
        hub
    }

    #[tokio::test]
    async fn disabled_retention_keeps_offline_devices() {
        let hub = hub_with_offline_device(0).await;

        assert_eq!(run_retention_pass(&hub).await, 0);
        assert_eq!(hub.registry().snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn retention_keeps_recently_offline_devices() {
        let hub = hub_with_offline_device(3600).await;

        assert_eq!(run_retention_pass(&hub).await, 0);
        assert_eq!(hub.registry().snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn retention_forgets_stale_offline_devices() {
        let hub = hub_with_offline_device(1).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(run_retention_pass(&hub).await, 1);
        assert!(hub.registry().snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn retention_task_can_be_aborted() {
        let hub = Arc::new(hub_with_offline_device(0).await);
        let handle = spawn_retention_task(hub);

        handle.abort();
        let result = handle.await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
