//! Repository for the `analysts` table.

use assetflow_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::analyst::{Analyst, AnalystPing};
use crate::models::status::{AnalystState, LockState};

/// Column list for `analysts` queries.
const COLUMNS: &str = "\
    id, endpoint, task_id, state_id, lock_id, total_ram_mb, free_ram_mb, \
    free_disk_mb, load, version, last_ping_at, created_at, updated_at";

/// Provides persistence for analysts.
pub struct AnalystRepo;

impl AnalystRepo {
    // -----------------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------------

    /// Register or refresh an analyst by endpoint (upsert).
    ///
    /// Always marks the analyst `Up` and stamps `last_ping_at`. A reported
    /// `task_id` replaces the stored one; an absent one keeps it.
    pub async fn upsert_ping(
        pool: &PgPool,
        endpoint: &str,
        input: &AnalystPing,
    ) -> Result<Analyst, sqlx::Error> {
        let query = format!(
            "INSERT INTO analysts \
                 (endpoint, task_id, state_id, total_ram_mb, free_ram_mb, free_disk_mb, load, version) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (endpoint) DO UPDATE SET \
                 task_id = COALESCE(EXCLUDED.task_id, analysts.task_id), \
                 state_id = EXCLUDED.state_id, \
                 total_ram_mb = EXCLUDED.total_ram_mb, \
                 free_ram_mb = EXCLUDED.free_ram_mb, \
                 free_disk_mb = EXCLUDED.free_disk_mb, \
                 load = EXCLUDED.load, \
                 version = EXCLUDED.version, \
                 last_ping_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Analyst>(&query)
            .bind(endpoint)
            .bind(input.task_id)
            .bind(AnalystState::Up.id())
            .bind(input.total_ram_mb)
            .bind(input.free_ram_mb)
            .bind(input.free_disk_mb)
            .bind(input.load)
            .bind(&input.version)
            .fetch_one(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Find an analyst by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Analyst>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analysts WHERE id = $1");
        sqlx::query_as::<_, Analyst>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an analyst by its endpoint.
    pub async fn find_by_endpoint(
        pool: &PgPool,
        endpoint: &str,
    ) -> Result<Option<Analyst>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analysts WHERE endpoint = $1");
        sqlx::query_as::<_, Analyst>(&query)
            .bind(endpoint)
            .fetch_optional(pool)
            .await
    }

    /// List all analysts ordered by endpoint.
    pub async fn list(pool: &PgPool) -> Result<Vec<Analyst>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM analysts ORDER BY endpoint ASC");
        sqlx::query_as::<_, Analyst>(&query).fetch_all(pool).await
    }

    /// Number of analysts in `state`.
    pub async fn count_in_state(pool: &PgPool, state: AnalystState) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM analysts WHERE state_id = $1")
            .bind(state.id())
            .fetch_one(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Set the dispatch lock. Returns `false` if the analyst does not exist.
    pub async fn set_lock(pool: &PgPool, id: DbId, lock: LockState) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE analysts SET lock_id = $2 WHERE id = $1")
            .bind(id)
            .bind(lock.id())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear the analyst's current task, but only if it still points at
    /// `task_id`.
    pub async fn clear_task(
        pool: &PgPool,
        endpoint: &str,
        task_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE analysts SET task_id = NULL WHERE endpoint = $1 AND task_id = $2",
        )
        .bind(endpoint)
        .bind(task_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every `Up` analyst whose last ping is older than `cutoff` as
    /// `Down`. Returns the endpoints that went down.
    pub async fn mark_stale_down(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "UPDATE analysts SET state_id = $1, task_id = NULL \
             WHERE state_id = $2 AND last_ping_at < $3 \
             RETURNING endpoint",
        )
        .bind(AnalystState::Down.id())
        .bind(AnalystState::Up.id())
        .bind(cutoff)
        .fetch_all(pool)
        .await
    }
}
