//! Background maintenance loops.
//!
//! Every replica runs all three. Reclaim and pause expiry take a cluster
//! lock per tick, so only one replica does the work; the lock reaper needs
//! none. Each loop stops when its [`CancellationToken`] is cancelled.

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;

pub mod lock_reaper;
pub mod orphan_reclaim;
pub mod pause_expiry;

/// Spawn every maintenance loop on the current runtime.
pub fn spawn_all(
    pool: &PgPool,
    config: &SchedulerConfig,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(orphan_reclaim::run(
            pool.clone(),
            config.clone(),
            cancel.clone(),
        )),
        tokio::spawn(pause_expiry::run(
            pool.clone(),
            config.clone(),
            cancel.clone(),
        )),
        tokio::spawn(lock_reaper::run(
            pool.clone(),
            config.lock_reaper_interval_secs,
            cancel.clone(),
        )),
    ]
}
