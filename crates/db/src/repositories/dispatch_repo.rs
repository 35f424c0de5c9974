//! Dispatch queries: candidate ranking and the atomic claim.
//!
//! Ranking and claiming are separate statements. The ranking query only
//! proposes candidates; a task belongs to an analyst only once the
//! conditional `Waiting -> Queued` update inside [`DispatchRepo::claim`]
//! affected exactly one row.

use std::collections::BTreeMap;

use assetflow_core::scheduling::{dispatch_env, log_name};
use assetflow_core::types::{ArgMap, DbId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::status::{JobState, TaskState};
use crate::models::task::{DispatchCandidate, DispatchTask, Task};
use crate::repositories::task_repo::COLUMNS as TASK_COLUMNS;

/// Job columns re-checked under the row lock before a claim.
type ClaimGate = (
    i16,
    bool,
    Option<Timestamp>,
    i32,
    i32,
    Json<ArgMap>,
    Json<BTreeMap<String, String>>,
);

/// Provides the dispatch ranking and claim protocol.
pub struct DispatchRepo;

impl DispatchRepo {
    /// Rank up to `limit` dispatchable tasks.
    ///
    /// A task is a candidate when its job is `InProgress`, not paused (or the
    /// pause has expired), below `max_running_tasks`, and the task itself is
    /// `Waiting`. Ordered by job priority, then task age, then id.
    pub async fn waiting_candidates(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<DispatchCandidate>, sqlx::Error> {
        sqlx::query_as::<_, DispatchCandidate>(
            "SELECT t.id AS task_id, t.job_id, j.priority \
             FROM tasks t \
             JOIN jobs j ON j.id = t.job_id \
             JOIN job_task_counts c ON c.job_id = j.id \
             WHERE j.state_id = $1 \
               AND (NOT j.paused OR j.pause_expires_at <= NOW()) \
               AND c.running + c.queued < j.max_running_tasks \
               AND t.state_id = $2 \
             ORDER BY j.priority ASC, t.created_at ASC, t.id ASC \
             LIMIT $3",
        )
        .bind(JobState::InProgress.id())
        .bind(TaskState::Waiting.id())
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Try to claim one candidate for the analyst at `endpoint`.
    ///
    /// Runs in a single transaction: the job and its counts row are locked
    /// `FOR UPDATE` so concurrent claims within one job serialize on the
    /// concurrency cap and each sees the previous claim's count; the
    /// job gate is re-checked; the task moves `Waiting -> Queued` with `host`
    /// set; the analyst's `task_id` is pointed at it. Returns `None` when any
    /// step finds the candidate no longer eligible.
    pub async fn claim(
        pool: &PgPool,
        candidate: DispatchCandidate,
        endpoint: &str,
    ) -> Result<Option<DispatchTask>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let gate: Option<ClaimGate> = sqlx::query_as(
            "SELECT j.state_id, j.paused, j.pause_expires_at, j.max_running_tasks, \
                    c.running + c.queued, j.args, j.env \
             FROM jobs j JOIN job_task_counts c ON c.job_id = j.id \
             WHERE j.id = $1 \
             FOR UPDATE OF j, c",
        )
        .bind(candidate.job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((state_id, paused, pause_expires_at, max_running, active, args, env)) = gate
        else {
            return Ok(None);
        };

        let pause_active = paused && pause_expires_at.map_or(true, |t| t > chrono::Utc::now());
        if state_id != JobState::InProgress.id() || pause_active || active >= max_running {
            tracing::debug!(
                task_id = candidate.task_id,
                job_id = candidate.job_id,
                "Claim gate closed, skipping candidate",
            );
            return Ok(None);
        }

        let query = format!(
            "UPDATE tasks SET \
                 state_id = $2, host = $3, last_ping_at = NOW(), \
                 exit_status = NULL, progress = 0, status = NULL, stopped_at = NULL \
             WHERE id = $1 AND state_id = $4 \
             RETURNING {TASK_COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Task>(&query)
            .bind(candidate.task_id)
            .bind(TaskState::Queued.id())
            .bind(endpoint)
            .bind(TaskState::Waiting.id())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(task) = claimed else {
            tracing::debug!(
                task_id = candidate.task_id,
                "Lost claim race, skipping candidate",
            );
            return Ok(None);
        };

        sqlx::query("UPDATE analysts SET task_id = $2 WHERE endpoint = $1")
            .bind(endpoint)
            .bind(task.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let env = dispatch_env(&env.0, task.id, task.job_id, task.project_id, task.run_count);
        Ok(Some(DispatchTask {
            id: task.id,
            job_id: task.job_id,
            project_id: task.project_id,
            log_name: log_name(task.id, task.run_count),
            name: task.name,
            state: TaskState::Queued,
            host: endpoint.to_string(),
            run_count: task.run_count,
            script: task.script.0,
            env,
            args: args.0,
        }))
    }
}
