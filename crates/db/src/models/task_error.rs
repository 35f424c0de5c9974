//! Task error log models.

use assetflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `task_errors` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TaskError {
    pub id: DbId,
    pub task_id: DbId,
    pub job_id: DbId,
    pub asset_id: Option<String>,
    pub path: Option<String>,
    pub message: String,
    pub processor: Option<String>,
    pub fatal: bool,
    pub stack: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

/// Input for recording an error reported by an analyst.
#[derive(Debug, Clone)]
pub struct CreateTaskError {
    pub task_id: DbId,
    pub job_id: DbId,
    pub asset_id: Option<String>,
    pub path: Option<String>,
    pub message: String,
    pub processor: Option<String>,
    pub fatal: bool,
    pub stack: Option<serde_json::Value>,
}
