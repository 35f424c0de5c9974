//! Task entity models and the dispatch projection handed to analysts.

use std::collections::BTreeMap;

use assetflow_core::error::CoreError;
use assetflow_core::status::TaskState;
use assetflow_core::types::{ArgMap, DbId, Timestamp};
use assetflow_core::zps::ZpsScript;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub job_id: DbId,
    pub project_id: DbId,
    pub parent_task_id: Option<DbId>,
    pub name: String,
    pub state_id: StatusId,
    pub host: Option<String>,
    pub run_count: i32,
    pub exit_status: Option<i32>,
    pub progress: i16,
    pub status: Option<String>,
    #[serde(skip_serializing)]
    pub expand_key: Option<String>,
    #[serde(skip_serializing)]
    pub script: Json<ZpsScript>,
    pub started_at: Option<Timestamp>,
    pub stopped_at: Option<Timestamp>,
    pub last_ping_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Typed state of this row.
    pub fn state(&self) -> Result<TaskState, CoreError> {
        TaskState::try_from(self.state_id)
    }
}

/// A task to insert as part of job creation.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub script: ZpsScript,
}

/// DTO for `POST /api/v1/jobs/{id}/tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub name: String,
    pub script: ZpsScript,
    /// Tasks (in any job) that must finish before this one is dispatched.
    #[serde(default)]
    pub depend_on_task_ids: Vec<DbId>,
}

/// Query parameters for `GET /api/v1/jobs/{id}/tasks`.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub state_id: Option<StatusId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A ranked dispatch candidate: the task id plus its job.
#[derive(Debug, Clone, Copy, FromRow, Serialize)]
pub struct DispatchCandidate {
    pub task_id: DbId,
    pub job_id: DbId,
    pub priority: i32,
}

/// Everything an analyst needs to run a claimed task.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchTask {
    pub id: DbId,
    pub job_id: DbId,
    pub project_id: DbId,
    pub name: String,
    pub state: TaskState,
    pub host: String,
    pub run_count: i32,
    pub log_name: String,
    pub script: ZpsScript,
    pub env: BTreeMap<String, String>,
    pub args: ArgMap,
}
