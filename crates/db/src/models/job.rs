//! Job entity models and DTOs.

use std::collections::BTreeMap;

use assetflow_core::error::CoreError;
use assetflow_core::scheduling::TaskStateCounts;
use assetflow_core::status::JobState;
use assetflow_core::types::{ArgMap, DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub state_id: StatusId,
    pub priority: i32,
    pub paused: bool,
    pub pause_expires_at: Option<Timestamp>,
    pub max_running_tasks: i32,
    pub args: Json<ArgMap>,
    pub env: Json<BTreeMap<String, String>>,
    pub started_at: Option<Timestamp>,
    pub stopped_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Typed state of this row.
    pub fn state(&self) -> Result<JobState, CoreError> {
        JobState::try_from(self.state_id)
    }
}

/// A row from the `job_task_counts` table.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct JobTaskCounts {
    pub job_id: DbId,
    pub total: i32,
    pub waiting: i32,
    pub running: i32,
    pub success: i32,
    pub failure: i32,
    pub skipped: i32,
    pub queued: i32,
    pub depend: i32,
}

impl From<JobTaskCounts> for TaskStateCounts {
    fn from(row: JobTaskCounts) -> Self {
        TaskStateCounts {
            total: row.total,
            waiting: row.waiting,
            running: row.running,
            success: row.success,
            failure: row.failure,
            skipped: row.skipped,
            queued: row.queued,
            depend: row.depend,
        }
    }
}

/// A job together with its task counters, as returned by `GET /jobs/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: Job,
    pub task_counts: TaskStateCounts,
}

/// Fully resolved input for inserting a job. Built by the job launcher
/// after pipeline resolution succeeded.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub project_id: DbId,
    pub name: String,
    pub priority: i32,
    pub paused: bool,
    pub pause_expires_at: Option<Timestamp>,
    pub max_running_tasks: i32,
    pub args: ArgMap,
    pub env: BTreeMap<String, String>,
}

/// DTO for `PUT /api/v1/jobs/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateJob {
    pub name: Option<String>,
    pub priority: Option<i32>,
    pub paused: Option<bool>,
    /// Seconds until a pause lifts on its own. Only used with `paused: true`.
    pub pause_duration_secs: Option<i64>,
    pub max_running_tasks: Option<i32>,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by state ID (e.g. 1 = InProgress, 5 = Failure).
    pub state_id: Option<StatusId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
