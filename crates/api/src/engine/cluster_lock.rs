//! Runs work under a named cluster lock.
//!
//! Every API replica runs the same maintenance loops; the lock makes sure
//! only one of them does the work on each tick.

use std::future::Future;
use std::time::Duration;

use assetflow_core::cluster_lock::{validate_lock, DEFAULT_LOCK_DURATION_SECS};
use assetflow_db::repositories::ClusterLockRepo;
use sqlx::PgPool;

use crate::error::AppResult;

/// Which lock to take and how hard to try.
#[derive(Debug, Clone)]
pub struct LockSpec {
    pub name: String,
    pub duration_secs: u64,
    /// Attempts before giving up. At least one attempt is always made.
    pub max_tries: u32,
    /// Keep the lock after the work finishes and let it expire, so the
    /// work runs at most once per `duration_secs` cluster-wide.
    pub hold_till_timeout: bool,
}

impl LockSpec {
    /// A single-attempt lock with the default duration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            duration_secs: DEFAULT_LOCK_DURATION_SECS,
            max_tries: 1,
            hold_till_timeout: false,
        }
    }

    pub fn duration_secs(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn max_tries(mut self, tries: u32) -> Self {
        self.max_tries = tries;
        self
    }

    pub fn hold_till_timeout(mut self, hold: bool) -> Self {
        self.hold_till_timeout = hold;
        self
    }
}

/// Executes closures only when a cluster lock was obtained.
#[derive(Debug, Clone)]
pub struct ClusterLockExecutor {
    pool: PgPool,
    /// Recorded as the lock holder.
    host: String,
    /// Back-off unit; attempt `n` waits `n * retry_delay`.
    retry_delay: Duration,
}

impl ClusterLockExecutor {
    pub fn new(pool: PgPool, host: impl Into<String>) -> Self {
        Self {
            pool,
            host: host.into(),
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run `work` while holding `spec.name`.
    ///
    /// Returns `Ok(None)` without running `work` when the lock stayed held
    /// elsewhere for all `max_tries` attempts.
    pub async fn run<F, Fut, T>(&self, spec: &LockSpec, work: F) -> AppResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        validate_lock(&spec.name, spec.duration_secs)?;

        let tries = spec.max_tries.max(1);
        let mut acquired = false;
        for attempt in 1..=tries {
            if ClusterLockRepo::lock(&self.pool, &spec.name, &self.host, spec.duration_secs).await?
            {
                acquired = true;
                break;
            }
            if attempt < tries {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        if !acquired {
            tracing::debug!(lock = %spec.name, tries, "Cluster lock held elsewhere");
            return Ok(None);
        }

        tracing::debug!(lock = %spec.name, host = %self.host, "Cluster lock acquired");
        let output = work().await;

        if !spec.hold_till_timeout {
            ClusterLockRepo::unlock(&self.pool, &spec.name, &self.host).await?;
        }
        Ok(Some(output))
    }
}
