//! Dependency edge model.

use assetflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::StatusId;

/// A row from the `depends` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Depend {
    pub id: DbId,
    pub depend_type_id: StatusId,
    pub state_id: StatusId,
    pub depender_job_id: DbId,
    pub depender_task_id: Option<DbId>,
    pub dependee_job_id: DbId,
    pub dependee_task_id: Option<DbId>,
    pub resolved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
