//! Repository for the `cluster_locks` table.
//!
//! A row's existence between `acquired_at` and `expires_at` is the lock.
//! Failing to acquire is an expected outcome (`false`), never an error.

use sqlx::PgPool;

use crate::models::cluster_lock::ClusterLock;

/// Column list for `cluster_locks` queries.
const COLUMNS: &str = "name, host, acquired_at, expires_at";

/// Provides the cluster-wide named mutex.
pub struct ClusterLockRepo;

impl ClusterLockRepo {
    /// Try to take the lock `name` for `duration_secs` on behalf of `host`.
    ///
    /// Returns `false` if another holder has the row, expired or not;
    /// expired rows are only released by [`ClusterLockRepo::clear_expired`].
    pub async fn lock(
        pool: &PgPool,
        name: &str,
        host: &str,
        duration_secs: u64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO cluster_locks (name, host, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3)) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .bind(host)
        .bind(duration_secs as f64)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Release the lock `name` held by `host`.
    ///
    /// Returns `false` if `host` does not hold it, including when its lock
    /// was reaped and another host took it since.
    pub async fn unlock(pool: &PgPool, name: &str, host: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM cluster_locks WHERE name = $1 AND host = $2")
            .bind(name)
            .bind(host)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether `name` is currently held and not yet expired.
    pub async fn is_locked(pool: &PgPool, name: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM cluster_locks WHERE name = $1 AND expires_at > NOW())",
        )
        .bind(name)
        .fetch_one(pool)
        .await
    }

    /// Find the lock row for `name`.
    pub async fn find(pool: &PgPool, name: &str) -> Result<Option<ClusterLock>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM cluster_locks WHERE name = $1");
        sqlx::query_as::<_, ClusterLock>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Delete every lock past its expiry and return the removed rows.
    pub async fn clear_expired(pool: &PgPool) -> Result<Vec<ClusterLock>, sqlx::Error> {
        let query = format!(
            "DELETE FROM cluster_locks WHERE expires_at <= NOW() RETURNING {COLUMNS}"
        );
        let cleared = sqlx::query_as::<_, ClusterLock>(&query)
            .fetch_all(pool)
            .await?;
        for lock in &cleared {
            tracing::warn!(
                name = %lock.name,
                host = %lock.host,
                expired_at = %lock.expires_at,
                "Cleared expired cluster lock",
            );
        }
        Ok(cleared)
    }
}
