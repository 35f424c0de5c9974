//! Hands the next task to an analyst.
//!
//! Ranking proposes candidates; [`DispatchRepo::claim`] decides. Candidates
//! lost to another replica are skipped and the next one is tried, re-ranking
//! in pages of `dispatch_poll_count` until a claim lands or nothing is left.

use assetflow_core::status::{AnalystState, LockState};
use assetflow_db::models::task::DispatchTask;
use assetflow_db::repositories::{AnalystRepo, DispatchRepo, TaskRepo};
use sqlx::PgPool;

use crate::config::SchedulerConfig;
use crate::engine::reclaim::reclaim_task;

/// Upper bound on ranking round trips per request.
const MAX_RANKING_PAGES: usize = 10;

/// Claim the next task for the analyst at `endpoint`.
///
/// Unknown, down and locked analysts get nothing. Any task the analyst
/// still holds is reclaimed first: an analyst asking for work is not
/// running anything.
pub async fn get_next(
    pool: &PgPool,
    config: &SchedulerConfig,
    endpoint: &str,
) -> Result<Option<DispatchTask>, sqlx::Error> {
    let Some(analyst) = AnalystRepo::find_by_endpoint(pool, endpoint).await? else {
        tracing::debug!(endpoint, "Dequeue from unknown analyst");
        return Ok(None);
    };
    if analyst.lock_id == LockState::Locked.id() || analyst.state_id != AnalystState::Up.id() {
        tracing::debug!(endpoint, "Analyst is locked or down, not dispatching");
        return Ok(None);
    }

    for leftover in TaskRepo::find_dispatched_on_host(pool, endpoint).await? {
        reclaim_task(pool, &leftover, config.task_retry_limit).await?;
    }

    for _ in 0..MAX_RANKING_PAGES {
        let candidates = DispatchRepo::waiting_candidates(pool, config.dispatch_poll_count).await?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let full_page = candidates.len() as i64 >= config.dispatch_poll_count;

        for candidate in candidates {
            if let Some(task) = DispatchRepo::claim(pool, candidate, endpoint).await? {
                tracing::info!(
                    task_id = task.id,
                    job_id = task.job_id,
                    endpoint,
                    run_count = task.run_count,
                    "Task dispatched",
                );
                return Ok(Some(task));
            }
        }

        if !full_page {
            return Ok(None);
        }
    }

    tracing::debug!(endpoint, "No candidate could be claimed");
    Ok(None)
}
