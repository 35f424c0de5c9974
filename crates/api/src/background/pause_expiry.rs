//! Periodic release of timed job pauses.

use std::time::Duration;

use assetflow_core::cluster_lock::LOCK_PAUSE_EXPIRY;
use assetflow_db::repositories::JobRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::engine::cluster_lock::{ClusterLockExecutor, LockSpec};

/// Run the pause expiry loop until `cancel` is triggered.
///
/// Dispatch already ignores expired pauses; this loop clears the flag so
/// job listings show the real state.
pub async fn run(pool: PgPool, config: SchedulerConfig, cancel: CancellationToken) {
    let executor = ClusterLockExecutor::new(pool.clone(), config.host.clone());
    let lock = LockSpec::new(LOCK_PAUSE_EXPIRY);

    tracing::info!(
        interval_secs = config.pause_expiry_interval_secs,
        "Pause expiry job started"
    );

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.pause_expiry_interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Pause expiry job stopping");
                break;
            }
            _ = interval.tick() => {
                match executor.run(&lock, || JobRepo::clear_expired_pauses(&pool)).await {
                    Ok(Some(Ok(job_ids))) => {
                        if !job_ids.is_empty() {
                            tracing::info!(jobs = ?job_ids, "Pause expiry: jobs unpaused");
                        }
                    }
                    Ok(None) => {}
                    Ok(Some(Err(e))) => {
                        tracing::error!(error = %e, "Pause expiry: update failed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Pause expiry: lock failed");
                    }
                }
            }
        }
    }
}
