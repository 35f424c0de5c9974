//! Repository for the `task_errors` table.

use assetflow_core::types::DbId;
use sqlx::PgPool;

use crate::models::task_error::{CreateTaskError, TaskError};

/// Column list for `task_errors` queries.
const COLUMNS: &str = "\
    id, task_id, job_id, asset_id, path, message, processor, fatal, stack, created_at";

/// Provides persistence for task error records.
pub struct TaskErrorRepo;

impl TaskErrorRepo {
    /// Record an error verbatim.
    pub async fn create(pool: &PgPool, input: &CreateTaskError) -> Result<TaskError, sqlx::Error> {
        let query = format!(
            "INSERT INTO task_errors \
                 (task_id, job_id, asset_id, path, message, processor, fatal, stack) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskError>(&query)
            .bind(input.task_id)
            .bind(input.job_id)
            .bind(&input.asset_id)
            .bind(&input.path)
            .bind(&input.message)
            .bind(&input.processor)
            .bind(input.fatal)
            .bind(&input.stack)
            .fetch_one(pool)
            .await
    }

    /// Errors recorded for a task, oldest first.
    pub async fn list_by_task(pool: &PgPool, task_id: DbId) -> Result<Vec<TaskError>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM task_errors WHERE task_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, TaskError>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Errors recorded for any task of a job, oldest first.
    pub async fn list_by_job(pool: &PgPool, job_id: DbId) -> Result<Vec<TaskError>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM task_errors WHERE job_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, TaskError>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
