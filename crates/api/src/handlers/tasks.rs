//! Handlers for the `/tasks` resource.

use assetflow_core::error::CoreError;
use assetflow_core::status::TaskState;
use assetflow_core::types::DbId;
use assetflow_db::models::task::Task;
use assetflow_db::repositories::{AnalystRepo, TaskErrorRepo, TaskRepo};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::engine::lifecycle::{settle_finished_task, settle_job};
use crate::error::{AppError, AppResult};
use crate::middleware::project::ProjectId;
use crate::response::DataResponse;
use crate::state::AppState;

/// Fetch a task by ID within the caller's project.
pub(crate) async fn find_task(pool: &sqlx::PgPool, project_id: DbId, task_id: DbId) -> AppResult<Task> {
    TaskRepo::find_by_id(pool, task_id)
        .await?
        .filter(|task| task.project_id == project_id)
        .ok_or(AppError::Core(CoreError::not_found("Task", task_id)))
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = find_task(&state.pool, project_id, task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// GET /api/v1/tasks/{id}/script
///
/// The resolved script the task runs, as handed to analysts.
pub async fn get_task_script(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = find_task(&state.pool, project_id, task_id).await?;
    Ok(Json(DataResponse { data: task.script.0 }))
}

/// GET /api/v1/tasks/{id}/errors
pub async fn list_task_errors(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_task(&state.pool, project_id, task_id).await?;
    let errors = TaskErrorRepo::list_by_task(&state.pool, task_id).await?;
    Ok(Json(DataResponse { data: errors }))
}

/// POST /api/v1/tasks/{id}/retry
///
/// Requeue a failed task with a fresh retry budget.
pub async fn retry_task(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = find_task(&state.pool, project_id, task_id).await?;
    if !TaskRepo::retry(&state.pool, task_id).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Task {task_id} is {} and cannot be retried",
            task.state()?
        ))));
    }
    tracing::info!(task_id, job_id = task.job_id, "Task requeued");
    settle_job(&state.pool, task.job_id).await?;

    let task = find_task(&state.pool, project_id, task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/skip
///
/// Mark an unfinished task skipped. Tasks waiting on it are released.
pub async fn skip_task(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = find_task(&state.pool, project_id, task_id).await?;
    let from = task.state()?;
    if !TaskRepo::try_transition(&state.pool, task_id, from, TaskState::Skipped).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Task {task_id} is {from} and cannot be skipped"
        ))));
    }
    if let Some(host) = task.host.as_deref().filter(|_| from.is_dispatched()) {
        AnalystRepo::clear_task(&state.pool, host, task_id).await?;
    }
    tracing::info!(task_id, job_id = task.job_id, from = %from, "Task skipped");
    settle_finished_task(&state.pool, task_id, task.job_id).await?;

    let task = find_task(&state.pool, project_id, task_id).await?;
    Ok(Json(DataResponse { data: task }))
}
