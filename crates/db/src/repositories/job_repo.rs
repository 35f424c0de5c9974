//! Repository for the `jobs` and `job_task_counts` tables.
//!
//! Job state is either an operator override (`Cancelled`, `Archived`) or
//! derived from task counts by [`JobRepo::recompute_state`]. Every state write
//! is a compare-and-swap on the current `state_id`.

use assetflow_core::scheduling::{derive_job_state, job_state_machine, TaskStateCounts};
use assetflow_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::job::{CreateJob, Job, JobListQuery, JobTaskCounts, UpdateJob};
use crate::models::status::{DependState, DependType, JobState, StatusId, TaskState};
use crate::models::task::{NewTask, Task};
use crate::repositories::task_repo::COLUMNS as TASK_COLUMNS;

/// Column list for `jobs` queries.
pub(crate) const COLUMNS: &str = "\
    id, project_id, name, state_id, priority, paused, pause_expires_at, \
    max_running_tasks, args, env, started_at, stopped_at, created_at, updated_at";

/// Column list for `job_task_counts` queries.
const COUNT_COLUMNS: &str = "\
    job_id, total, waiting, running, success, failure, skipped, queued, depend";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Job states that can be archived.
const ARCHIVABLE_STATES: [StatusId; 3] = [
    JobState::Success as StatusId,
    JobState::Failure as StatusId,
    JobState::Cancelled as StatusId,
];

/// Provides persistence for jobs.
pub struct JobRepo;

impl JobRepo {
    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Insert a job, its JobOnJob dependency edges and its tasks in one
    /// transaction.
    ///
    /// Dependee jobs are locked `FOR SHARE` so none of them can finish
    /// between the state check and the edge insert. Edges are only created
    /// for dependees that have not finished; if any edge exists the tasks
    /// start in `Depend`, otherwise in `Waiting`.
    pub async fn create_with_tasks(
        pool: &PgPool,
        input: &CreateJob,
        tasks: &[NewTask],
        depend_on_job_ids: &[DbId],
    ) -> Result<(Job, Vec<Task>), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO jobs \
                 (project_id, name, state_id, priority, paused, pause_expires_at, \
                  max_running_tasks, args, env, started_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(input.project_id)
            .bind(&input.name)
            .bind(JobState::InProgress.id())
            .bind(input.priority)
            .bind(input.paused)
            .bind(input.pause_expires_at)
            .bind(input.max_running_tasks)
            .bind(Json(&input.args))
            .bind(Json(&input.env))
            .fetch_one(&mut *tx)
            .await?;

        let mut edges = 0;
        if !depend_on_job_ids.is_empty() {
            let dependees: Vec<(DbId, StatusId)> = sqlx::query_as(
                "SELECT id, state_id FROM jobs WHERE id = ANY($1) ORDER BY id FOR SHARE",
            )
            .bind(depend_on_job_ids)
            .fetch_all(&mut *tx)
            .await?;

            for (dependee_id, state_id) in dependees {
                if state_id != JobState::InProgress.id() {
                    continue;
                }
                sqlx::query(
                    "INSERT INTO depends \
                         (depend_type_id, state_id, depender_job_id, dependee_job_id) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(DependType::JobOnJob.id())
                .bind(DependState::Active.id())
                .bind(job.id)
                .bind(dependee_id)
                .execute(&mut *tx)
                .await?;
                edges += 1;
            }
        }

        let initial_state = if edges > 0 {
            TaskState::Depend
        } else {
            TaskState::Waiting
        };

        let insert_task = format!(
            "INSERT INTO tasks (job_id, project_id, name, state_id, script) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {TASK_COLUMNS}"
        );
        let mut created = Vec::with_capacity(tasks.len());
        for task in tasks {
            let row = sqlx::query_as::<_, Task>(&insert_task)
                .bind(job.id)
                .bind(job.project_id)
                .bind(&task.name)
                .bind(initial_state.id())
                .bind(Json(&task.script))
                .fetch_one(&mut *tx)
                .await?;
            created.push(row);
        }

        tx.commit().await?;

        tracing::debug!(
            job_id = job.id,
            tasks = created.len(),
            depend_edges = edges,
            "Job rows inserted",
        );

        Ok((job, created))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Find a job by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Return the subset of `ids` that do not exist.
    pub async fn find_missing(pool: &PgPool, ids: &[DbId]) -> Result<Vec<DbId>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_scalar::<_, DbId>(
            "SELECT wanted FROM UNNEST($1::BIGINT[]) AS wanted \
             WHERE NOT EXISTS (SELECT 1 FROM jobs WHERE jobs.id = wanted) \
             ORDER BY wanted",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }

    /// List jobs for a project, newest first, with optional state filter.
    pub async fn list(
        pool: &PgPool,
        project_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE project_id = $1 AND ($2::SMALLINT IS NULL OR state_id = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(project_id)
            .bind(params.state_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Fetch the per-state task counters of a job.
    pub async fn task_counts(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Option<TaskStateCounts>, sqlx::Error> {
        let query = format!("SELECT {COUNT_COLUMNS} FROM job_task_counts WHERE job_id = $1");
        let row = sqlx::query_as::<_, JobTaskCounts>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(TaskStateCounts::from))
    }

    // -----------------------------------------------------------------------
    // Updates
    // -----------------------------------------------------------------------

    /// Apply a partial update. Returns `None` if the job does not exist.
    ///
    /// Setting `paused` to `false` clears any pause expiry; a pause duration
    /// is only recorded when pausing.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateJob,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET \
                 name = COALESCE($2, name), \
                 priority = COALESCE($3, priority), \
                 paused = COALESCE($4, paused), \
                 pause_expires_at = CASE \
                     WHEN $4 IS NULL THEN pause_expires_at \
                     WHEN $4 AND $5::BIGINT IS NOT NULL \
                         THEN NOW() + make_interval(secs => $5::BIGINT) \
                     ELSE NULL END, \
                 max_running_tasks = COALESCE($6, max_running_tasks) \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(input.priority)
            .bind(input.paused)
            .bind(input.pause_duration_secs)
            .bind(input.max_running_tasks)
            .fetch_optional(pool)
            .await
    }

    /// Compare-and-swap the job state.
    ///
    /// Returns `false` when the job is no longer in `from` (lost race) or the
    /// edge is not part of the job state machine. Entering a finished state
    /// stamps `stopped_at`; re-entering `InProgress` clears it.
    pub async fn try_transition(
        pool: &PgPool,
        id: DbId,
        from: JobState,
        to: JobState,
    ) -> Result<bool, sqlx::Error> {
        if !job_state_machine::can_transition(from, to) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE jobs SET \
                 state_id = $3, \
                 stopped_at = CASE WHEN $4 THEN NOW() ELSE NULL END \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(from.id())
        .bind(to.id())
        .bind(to.is_finished())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Re-derive the job state from its task counts.
    ///
    /// Returns the new state when it changed, `None` when the stored state
    /// already matched, the job is an override state, or another writer got
    /// there first.
    pub async fn recompute_state(pool: &PgPool, id: DbId) -> Result<Option<JobState>, sqlx::Error> {
        let row: Option<(StatusId, i32, i32, i32, i32, i32, i32, i32, i32)> = sqlx::query_as(
            "SELECT j.state_id, c.total, c.waiting, c.running, c.success, c.failure, \
                    c.skipped, c.queued, c.depend \
             FROM jobs j JOIN job_task_counts c ON c.job_id = j.id \
             WHERE j.id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        let Some((state_id, total, waiting, running, success, failure, skipped, queued, depend)) =
            row
        else {
            return Ok(None);
        };
        let current = JobState::try_from(state_id)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let counts = TaskStateCounts {
            total,
            waiting,
            running,
            success,
            failure,
            skipped,
            queued,
            depend,
        };

        let derived = derive_job_state(current, &counts);
        if derived == current {
            return Ok(None);
        }
        if Self::try_transition(pool, id, current, derived).await? {
            tracing::info!(
                job_id = id,
                from = %current,
                to = %derived,
                "Job state recomputed",
            );
            Ok(Some(derived))
        } else {
            Ok(None)
        }
    }

    /// Archive a finished job. Returns `false` if the job is still running
    /// or already archived.
    pub async fn archive(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET state_id = $2 \
             WHERE id = $1 AND state_id = ANY($3)",
        )
        .bind(id)
        .bind(JobState::Archived.id())
        .bind(&ARCHIVABLE_STATES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Unpause every job whose pause expiry has passed.
    pub async fn clear_expired_pauses(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE jobs SET paused = false, pause_expires_at = NULL \
             WHERE paused AND pause_expires_at IS NOT NULL AND pause_expires_at <= NOW() \
             RETURNING id",
        )
        .fetch_all(pool)
        .await
    }
}
