//! Repository for the `depends` table.
//!
//! Edges are resolved eagerly: when a dependee finishes, its edges flip to
//! `Inactive` and every depender task left with no active edge moves from
//! `Depend` to `Waiting`. The dispatch query never joins this table.

use assetflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::depend::Depend;
use crate::models::status::{DependState, DependType, TaskState};

/// Column list for `depends` queries.
const COLUMNS: &str = "\
    id, depend_type_id, state_id, depender_job_id, depender_task_id, \
    dependee_job_id, dependee_task_id, resolved_at, created_at, updated_at";

/// Provides persistence for dependency edges.
pub struct DependRepo;

impl DependRepo {
    /// Edges where `job_id` is the depender or the dependee.
    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<Depend>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM depends \
             WHERE depender_job_id = $1 OR dependee_job_id = $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, Depend>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Edges held by a depender task, active or not.
    pub async fn list_for_task(pool: &PgPool, task_id: DbId) -> Result<Vec<Depend>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM depends \
             WHERE depender_task_id = $1 OR dependee_task_id = $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, Depend>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Resolve the TaskOnTask edges pointing at a finished task.
    ///
    /// Returns the ids of tasks released from `Depend` to `Waiting`.
    pub async fn resolve_task(pool: &PgPool, dependee_task_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        Self::resolve(pool, DependType::TaskOnTask, dependee_task_id).await
    }

    /// Resolve the JobOnJob edges pointing at a finished job.
    ///
    /// Returns the ids of tasks released from `Depend` to `Waiting`.
    pub async fn resolve_job(pool: &PgPool, dependee_job_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        Self::resolve(pool, DependType::JobOnJob, dependee_job_id).await
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Flip the active edges of one dependee and release what became ready.
    ///
    /// The depender job rows are locked `FOR NO KEY UPDATE` in id order
    /// before any edge changes. Two dependees of the same depender therefore
    /// resolve one after the other, and the second one's release check sees
    /// the first one's committed flip. `TaskRepo::create` takes `FOR SHARE`
    /// on its job row for the same reason.
    async fn resolve(
        pool: &PgPool,
        depend_type: DependType,
        dependee_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let dependee_column = match depend_type {
            DependType::TaskOnTask => "dependee_task_id",
            DependType::JobOnJob => "dependee_job_id",
        };

        let mut tx = pool.begin().await?;

        let locked: Vec<DbId> = sqlx::query_scalar(&format!(
            "SELECT j.id FROM jobs j \
             WHERE j.id IN ( \
                 SELECT d.depender_job_id FROM depends d \
                 WHERE d.depend_type_id = $1 AND d.state_id = $2 AND d.{dependee_column} = $3 \
             ) \
             ORDER BY j.id \
             FOR NO KEY UPDATE"
        ))
        .bind(depend_type.id())
        .bind(DependState::Active.id())
        .bind(dependee_id)
        .fetch_all(&mut *tx)
        .await?;

        if locked.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let depender_jobs: Vec<DbId> = sqlx::query_scalar(&format!(
            "UPDATE depends SET state_id = $1, resolved_at = NOW() \
             WHERE depend_type_id = $2 AND state_id = $3 AND {dependee_column} = $4 \
             RETURNING depender_job_id"
        ))
        .bind(DependState::Inactive.id())
        .bind(depend_type.id())
        .bind(DependState::Active.id())
        .bind(dependee_id)
        .fetch_all(&mut *tx)
        .await?;

        let released = Self::release_ready(&mut tx, &depender_jobs).await?;
        tx.commit().await?;
        Ok(released)
    }

    /// Move every `Depend` task of the given jobs that has no active edge
    /// left (task-level or job-level) to `Waiting`.
    async fn release_ready(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        depender_job_ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        if depender_job_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_scalar::<_, DbId>(
            "UPDATE tasks t SET state_id = $2 \
             WHERE t.job_id = ANY($1) AND t.state_id = $3 \
               AND NOT EXISTS ( \
                   SELECT 1 FROM depends d \
                   WHERE d.state_id = $4 \
                     AND ( \
                         (d.depend_type_id = $5 AND d.depender_task_id = t.id) \
                         OR (d.depend_type_id = $6 AND d.depender_job_id = t.job_id) \
                     ) \
               ) \
             RETURNING t.id",
        )
        .bind(depender_job_ids)
        .bind(TaskState::Waiting.id())
        .bind(TaskState::Depend.id())
        .bind(DependState::Active.id())
        .bind(DependType::TaskOnTask.id())
        .bind(DependType::JobOnJob.id())
        .fetch_all(&mut **tx)
        .await
    }
}
