//! Repository for the `tasks` table.
//!
//! Every state change goes through a conditional `UPDATE ... WHERE id = $1
//! AND state_id = $from`. Zero affected rows means another writer changed the
//! task first; callers treat that as a lost race, never as success.

use assetflow_core::scheduling::task_state_machine;
use assetflow_core::types::{DbId, Timestamp};
use assetflow_core::zps::ZpsScript;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::status::{AnalystState, DependState, DependType, JobState, StatusId, TaskState};
use crate::models::task::{CreateTask, Task, TaskListQuery};

/// Column list for `tasks` queries.
pub(crate) const COLUMNS: &str = "\
    id, job_id, project_id, parent_task_id, name, state_id, host, run_count, \
    exit_status, progress, status, expand_key, script, \
    started_at, stopped_at, last_ping_at, created_at, updated_at";

/// Maximum page size for task listing.
const MAX_LIMIT: i64 = 500;

/// Default page size for task listing.
const DEFAULT_LIMIT: i64 = 100;

/// States in which a task is held by an analyst.
const DISPATCHED_STATES: [StatusId; 2] = [
    TaskState::Queued as StatusId,
    TaskState::Running as StatusId,
];

/// Provides persistence for tasks.
pub struct TaskRepo;

impl TaskRepo {
    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Find a task by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Fetch only the script blob of a task.
    pub async fn find_script(pool: &PgPool, id: DbId) -> Result<Option<ZpsScript>, sqlx::Error> {
        let row: Option<(Json<ZpsScript>,)> =
            sqlx::query_as("SELECT script FROM tasks WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(script,)| script.0))
    }

    /// List the tasks of a job in creation order.
    pub async fn list_by_job(
        pool: &PgPool,
        job_id: DbId,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE job_id = $1 AND ($2::SMALLINT IS NULL OR state_id = $2) \
             ORDER BY created_at ASC, id ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(job_id)
            .bind(params.state_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Tasks currently queued on or running on `host`.
    pub async fn find_dispatched_on_host(
        pool: &PgPool,
        host: &str,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE host = $1 AND state_id = ANY($2) \
             ORDER BY id"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(host)
            .bind(&DISPATCHED_STATES[..])
            .fetch_all(pool)
            .await
    }

    /// Dispatched tasks that lost their analyst.
    ///
    /// A task is orphaned when no `Up` analyst owns its host, or when its own
    /// `last_ping_at` is older than `cutoff` and the analyst on its host no
    /// longer reports it as the current task.
    pub async fn find_orphaned(pool: &PgPool, cutoff: Timestamp) -> Result<Vec<Task>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks t \
             WHERE t.state_id = ANY($1) \
               AND ( \
                   NOT EXISTS ( \
                       SELECT 1 FROM analysts a \
                       WHERE a.endpoint = t.host AND a.state_id = $2 \
                   ) \
                   OR ( \
                       t.last_ping_at < $3 \
                       AND NOT EXISTS ( \
                           SELECT 1 FROM analysts a \
                           WHERE a.endpoint = t.host AND a.task_id = t.id \
                       ) \
                   ) \
               ) \
             ORDER BY t.id"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(&DISPATCHED_STATES[..])
            .bind(AnalystState::Up.id())
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Add a task to an existing job, with optional TaskOnTask dependencies.
    ///
    /// The job row is locked `FOR SHARE` first, so a concurrent
    /// `DependRepo` resolve for this job either finishes before the edge
    /// count below or waits for this insert to commit. Dependee tasks are
    /// then locked `FOR SHARE`; edges are only created for dependees that
    /// have not finished. The task starts in `Depend` if it has any active
    /// task edge or its job has any active job edge.
    pub async fn create(
        pool: &PgPool,
        job_id: DbId,
        project_id: DbId,
        input: &CreateTask,
    ) -> Result<Task, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM jobs WHERE id = $1 FOR SHARE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut open_dependees: Vec<(DbId, DbId)> = Vec::new();
        if !input.depend_on_task_ids.is_empty() {
            let rows: Vec<(DbId, DbId, StatusId)> = sqlx::query_as(
                "SELECT id, job_id, state_id FROM tasks \
                 WHERE id = ANY($1) ORDER BY id FOR SHARE",
            )
            .bind(&input.depend_on_task_ids)
            .fetch_all(&mut *tx)
            .await?;
            open_dependees = rows
                .into_iter()
                .filter(|(_, _, state_id)| {
                    TaskState::try_from(*state_id).is_ok_and(|s| !s.is_finished())
                })
                .map(|(id, job, _)| (id, job))
                .collect();
        }

        let job_edges: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM depends \
             WHERE depend_type_id = $1 AND state_id = $2 AND depender_job_id = $3",
        )
        .bind(DependType::JobOnJob.id())
        .bind(DependState::Active.id())
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        let initial_state = if open_dependees.is_empty() && job_edges == 0 {
            TaskState::Waiting
        } else {
            TaskState::Depend
        };

        let query = format!(
            "INSERT INTO tasks (job_id, project_id, name, state_id, script) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, Task>(&query)
            .bind(job_id)
            .bind(project_id)
            .bind(&input.name)
            .bind(initial_state.id())
            .bind(Json(&input.script))
            .fetch_one(&mut *tx)
            .await?;

        for (dependee_task_id, dependee_job_id) in &open_dependees {
            sqlx::query(
                "INSERT INTO depends \
                     (depend_type_id, state_id, depender_job_id, depender_task_id, \
                      dependee_job_id, dependee_task_id) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(DependType::TaskOnTask.id())
            .bind(DependState::Active.id())
            .bind(job_id)
            .bind(task.id)
            .bind(dependee_job_id)
            .bind(dependee_task_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Insert a child task produced by an EXPAND event.
    ///
    /// Only inserts while the job is `InProgress`. The `(job_id, expand_key)`
    /// unique constraint makes redelivered events a no-op; `None` is returned
    /// for a duplicate or a job that is no longer running.
    pub async fn create_expanded(
        pool: &PgPool,
        job_id: DbId,
        parent_task_id: DbId,
        name: &str,
        script: &ZpsScript,
        expand_key: &str,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (job_id, project_id, parent_task_id, name, state_id, script, expand_key) \
             SELECT j.id, j.project_id, $2, $3, $4, $5, $6 FROM jobs j \
             WHERE j.id = $1 AND j.state_id = $7 \
             ON CONFLICT (job_id, expand_key) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(job_id)
            .bind(parent_task_id)
            .bind(name)
            .bind(TaskState::Waiting.id())
            .bind(Json(script))
            .bind(expand_key)
            .bind(JobState::InProgress.id())
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    /// Compare-and-swap the task state.
    ///
    /// Entering `Running` stamps `started_at` and `last_ping_at`; entering a
    /// finished state stamps `stopped_at`; re-entering `Waiting` resets
    /// progress. Edges outside the task state machine return `false` without
    /// touching the database.
    pub async fn try_transition(
        pool: &PgPool,
        id: DbId,
        from: TaskState,
        to: TaskState,
    ) -> Result<bool, sqlx::Error> {
        if !task_state_machine::can_transition(from, to) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE tasks SET \
                 state_id = $3, \
                 started_at = CASE WHEN $4 THEN NOW() ELSE started_at END, \
                 last_ping_at = CASE WHEN $4 THEN NOW() ELSE last_ping_at END, \
                 stopped_at = CASE WHEN $5 THEN NOW() WHEN $6 THEN NULL ELSE stopped_at END, \
                 progress = CASE WHEN $6 THEN 0 WHEN $3 = $7 THEN 100 ELSE progress END \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(from.id())
        .bind(to.id())
        .bind(to == TaskState::Running)
        .bind(to.is_finished())
        .bind(to == TaskState::Waiting)
        .bind(TaskState::Success.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the end of an attempt: compare-and-swap `from -> to`, store the
    /// exit status and bump `run_count` when the attempt failed.
    pub async fn finish_attempt(
        pool: &PgPool,
        id: DbId,
        from: TaskState,
        to: TaskState,
        exit_status: i32,
        failed_attempt: bool,
    ) -> Result<bool, sqlx::Error> {
        if !task_state_machine::can_transition(from, to) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE tasks SET \
                 state_id = $3, \
                 exit_status = $4, \
                 run_count = run_count + CASE WHEN $5 THEN 1 ELSE 0 END, \
                 stopped_at = NOW(), \
                 progress = CASE WHEN $3 = $6 THEN 100 WHEN $3 = $7 THEN 0 ELSE progress END \
             WHERE id = $1 AND state_id = $2",
        )
        .bind(id)
        .bind(from.id())
        .bind(to.id())
        .bind(exit_status)
        .bind(failed_attempt)
        .bind(TaskState::Success.id())
        .bind(TaskState::Waiting.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Pull a dispatched task back from its analyst: `from -> to` with
    /// `run_count + 1`. `to` is `Waiting` or, once retries are exhausted,
    /// `Failure`.
    pub async fn reclaim(
        pool: &PgPool,
        id: DbId,
        from: TaskState,
        to: TaskState,
    ) -> Result<bool, sqlx::Error> {
        if !task_state_machine::can_transition(from, to) {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE tasks SET \
                 state_id = $3, \
                 run_count = run_count + 1, \
                 progress = 0, \
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

    /// Operator retry: `Failure -> Waiting` with a fresh retry budget.
    pub async fn retry(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET \
                 state_id = $2, run_count = 0, exit_status = NULL, progress = 0, \
                 stopped_at = NULL \
             WHERE id = $1 AND state_id = $3",
        )
        .bind(id)
        .bind(TaskState::Waiting.id())
        .bind(TaskState::Failure.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Operator retry of every failed task in a job. Returns the retried ids.
    pub async fn retry_failures(pool: &PgPool, job_id: DbId) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "UPDATE tasks SET \
                 state_id = $2, run_count = 0, exit_status = NULL, progress = 0, \
                 stopped_at = NULL \
             WHERE job_id = $1 AND state_id = $3 \
             RETURNING id",
        )
        .bind(job_id)
        .bind(TaskState::Waiting.id())
        .bind(TaskState::Failure.id())
        .fetch_all(pool)
        .await
    }

    // -----------------------------------------------------------------------
    // Progress reporting
    // -----------------------------------------------------------------------

    /// Update progress of a running task. Returns `false` if it is not running.
    pub async fn set_progress(pool: &PgPool, id: DbId, progress: i16) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET progress = $2, last_ping_at = NOW() \
             WHERE id = $1 AND state_id = $3",
        )
        .bind(id)
        .bind(progress)
        .bind(TaskState::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update the free-form status line of a running task.
    pub async fn set_status(pool: &PgPool, id: DbId, status: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $2, last_ping_at = NOW() \
             WHERE id = $1 AND state_id = $3",
        )
        .bind(id)
        .bind(status)
        .bind(TaskState::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Refresh `last_ping_at` of a task that is dispatched to `host`.
    pub async fn touch_ping(pool: &PgPool, id: DbId, host: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET last_ping_at = NOW() \
             WHERE id = $1 AND host = $2 AND state_id = ANY($3)",
        )
        .bind(id)
        .bind(host)
        .bind(&DISPATCHED_STATES[..])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
