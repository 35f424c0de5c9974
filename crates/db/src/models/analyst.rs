//! Analyst entity models and DTOs.

use assetflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `analysts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Analyst {
    pub id: DbId,
    pub endpoint: String,
    pub task_id: Option<DbId>,
    pub state_id: StatusId,
    pub lock_id: StatusId,
    pub total_ram_mb: i64,
    pub free_ram_mb: i64,
    pub free_disk_mb: i64,
    pub load: f64,
    pub version: String,
    pub last_ping_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Heartbeat body for `POST /api/v1/analyst/ping`. The endpoint itself
/// comes from the `x-analyst-endpoint` header.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalystPing {
    pub total_ram_mb: i64,
    pub free_ram_mb: i64,
    pub free_disk_mb: i64,
    pub load: f64,
    pub version: String,
    /// Task the analyst is currently running, if any.
    pub task_id: Option<DbId>,
}
