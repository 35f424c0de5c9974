//! Periodic reclaim of tasks held by analysts that stopped pinging.

use std::time::Duration;

use assetflow_core::cluster_lock::LOCK_RECLAIM;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::engine::cluster_lock::{ClusterLockExecutor, LockSpec};
use crate::engine::reclaim::reclaim_orphans;

/// Run the reclaim loop until `cancel` is triggered.
///
/// Each tick runs one sweep under the `reclaim-tasks` cluster lock, so
/// only one replica sweeps at a time.
pub async fn run(pool: PgPool, config: SchedulerConfig, cancel: CancellationToken) {
    let executor = ClusterLockExecutor::new(pool.clone(), config.host.clone());
    let lock = LockSpec::new(LOCK_RECLAIM);
    let period = Duration::from_secs(config.reclaim_interval_secs);

    tracing::info!(
        interval_secs = config.reclaim_interval_secs,
        analyst_timeout_secs = config.analyst_timeout_secs,
        "Orphan reclaim job started"
    );

    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Orphan reclaim job stopping");
                break;
            }
            _ = interval.tick() => {
                match executor.run(&lock, || reclaim_orphans(&pool, &config)).await {
                    Ok(Some(Ok(_))) | Ok(None) => {}
                    Ok(Some(Err(e))) => {
                        tracing::error!(error = %e, "Orphan reclaim: sweep failed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Orphan reclaim: lock failed");
                    }
                }
            }
        }
    }
}
