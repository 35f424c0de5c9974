//! Periodic cleanup of expired cluster locks.
//!
//! A holder that crashed never unlocks; its lock is deleted here once
//! `expires_at` has passed.

use std::time::Duration;

use assetflow_db::repositories::ClusterLockRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// Run the lock reaper loop until `cancel` is triggered.
pub async fn run(pool: PgPool, interval_secs: u64, cancel: CancellationToken) {
    tracing::info!(interval_secs, "Lock reaper job started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock reaper job stopping");
                break;
            }
            _ = interval.tick() => {
                match ClusterLockRepo::clear_expired(&pool).await {
                    Ok(cleared) => {
                        if cleared.is_empty() {
                            tracing::debug!("Lock reaper: no expired locks");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Lock reaper: cleanup failed");
                    }
                }
            }
        }
    }
}
