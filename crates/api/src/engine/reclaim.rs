//! Reclaiming tasks from analysts that stopped answering.

use assetflow_core::analyst::stale_cutoff;
use assetflow_core::scheduling::retry_or_fail;
use assetflow_core::status::TaskState;
use assetflow_db::models::task::Task;
use assetflow_db::repositories::{AnalystRepo, TaskRepo};
use sqlx::PgPool;

use crate::config::SchedulerConfig;
use crate::engine::lifecycle::settle_finished_task;

/// Pull one dispatched task back from its analyst.
///
/// The task returns to `Waiting` with `run_count + 1`, or goes to `Failure`
/// once the retry limit is used up. Returns the new state, or `None` when
/// the task had already moved on.
pub async fn reclaim_task(
    pool: &PgPool,
    task: &Task,
    retry_limit: i32,
) -> Result<Option<TaskState>, sqlx::Error> {
    let from = task
        .state()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    if !from.is_dispatched() {
        return Ok(None);
    }

    let to = retry_or_fail(task.run_count, retry_limit);
    if !TaskRepo::reclaim(pool, task.id, from, to).await? {
        tracing::debug!(task_id = task.id, from = %from, "Task moved before reclaim");
        return Ok(None);
    }

    if let Some(host) = &task.host {
        AnalystRepo::clear_task(pool, host, task.id).await?;
    }

    tracing::warn!(
        task_id = task.id,
        job_id = task.job_id,
        host = task.host.as_deref().unwrap_or(""),
        from = %from,
        to = %to,
        run_count = task.run_count + 1,
        "Task reclaimed",
    );

    if to.is_finished() {
        settle_finished_task(pool, task.id, task.job_id).await?;
    }
    Ok(Some(to))
}

/// One reclaim sweep: mark silent analysts down, then reclaim every
/// orphaned task. Returns the number of tasks reclaimed.
pub async fn reclaim_orphans(pool: &PgPool, config: &SchedulerConfig) -> Result<usize, sqlx::Error> {
    let cutoff = stale_cutoff(chrono::Utc::now(), config.analyst_timeout_secs);

    let down = AnalystRepo::mark_stale_down(pool, cutoff).await?;
    for endpoint in &down {
        tracing::warn!(endpoint = %endpoint, "Analyst stopped pinging, marked down");
    }

    let orphans = TaskRepo::find_orphaned(pool, cutoff).await?;
    let mut reclaimed = 0;
    for task in &orphans {
        if reclaim_task(pool, task, config.task_retry_limit).await?.is_some() {
            reclaimed += 1;
        }
    }

    if reclaimed > 0 || !down.is_empty() {
        tracing::info!(
            analysts_down = down.len(),
            reclaimed,
            "Reclaim sweep finished",
        );
    }
    Ok(reclaimed)
}
