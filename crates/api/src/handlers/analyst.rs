//! Handlers for the analyst-facing endpoints and analyst administration.
//!
//! Analyst endpoints identify the caller with [`AnalystEndpoint`].

use assetflow_core::analyst::{validate_metrics, validate_version};
use assetflow_core::error::CoreError;
use assetflow_core::status::LockState;
use assetflow_core::types::DbId;
use assetflow_db::models::analyst::{Analyst, AnalystPing};
use assetflow_db::repositories::{AnalystRepo, TaskRepo};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::engine::dispatcher::get_next;
use crate::engine::lifecycle::{handle_event, TaskEvent};
use crate::error::{AppError, AppResult};
use crate::middleware::analyst::AnalystEndpoint;
use crate::response::DataResponse;
use crate::state::AppState;

async fn find_analyst(pool: &sqlx::PgPool, id: DbId) -> AppResult<Analyst> {
    AnalystRepo::find_by_id(pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Analyst", id)))
}

// ---------------------------------------------------------------------------
// Analyst-facing
// ---------------------------------------------------------------------------

/// POST /api/v1/analyst/ping
///
/// Register or refresh the calling analyst. A reported `task_id` also
/// refreshes that task's ping when it is dispatched to this analyst.
pub async fn ping(
    AnalystEndpoint(endpoint): AnalystEndpoint,
    State(state): State<AppState>,
    Json(input): Json<AnalystPing>,
) -> AppResult<impl IntoResponse> {
    validate_metrics(
        input.total_ram_mb,
        input.free_ram_mb,
        input.free_disk_mb,
        input.load,
    )?;
    validate_version(&input.version)?;

    let analyst = AnalystRepo::upsert_ping(&state.pool, &endpoint, &input).await?;
    if let Some(task_id) = input.task_id {
        if !TaskRepo::touch_ping(&state.pool, task_id, &endpoint).await? {
            tracing::debug!(task_id, endpoint = %endpoint, "Pinged task is not held by analyst");
        }
    }

    tracing::debug!(analyst_id = analyst.id, endpoint = %endpoint, "Analyst ping");
    Ok(Json(DataResponse { data: analyst }))
}

/// POST /api/v1/analyst/dequeue
///
/// Claim the next task for the calling analyst. `data` is `null` when there
/// is nothing to run.
pub async fn dequeue(
    AnalystEndpoint(endpoint): AnalystEndpoint,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let task = get_next(&state.pool, state.scheduler(), &endpoint).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/analyst/events
///
/// Apply a lifecycle event for a task held by the calling analyst.
pub async fn post_event(
    AnalystEndpoint(endpoint): AnalystEndpoint,
    State(state): State<AppState>,
    Json(event): Json<TaskEvent>,
) -> AppResult<impl IntoResponse> {
    let ack = handle_event(&state.pool, state.scheduler(), &endpoint, event).await?;
    Ok(Json(DataResponse { data: ack }))
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

/// GET /api/v1/analysts
pub async fn list_analysts(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let analysts = AnalystRepo::list(&state.pool).await?;
    Ok(Json(DataResponse { data: analysts }))
}

/// GET /api/v1/analysts/{id}
pub async fn get_analyst(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let analyst = find_analyst(&state.pool, id).await?;
    Ok(Json(DataResponse { data: analyst }))
}

async fn set_lock(state: &AppState, id: DbId, lock: LockState) -> AppResult<Analyst> {
    if !AnalystRepo::set_lock(&state.pool, id, lock).await? {
        return Err(AppError::Core(CoreError::not_found("Analyst", id)));
    }
    tracing::info!(analyst_id = id, lock = %lock, "Analyst lock changed");
    find_analyst(&state.pool, id).await
}

/// PUT /api/v1/analysts/{id}/lock
///
/// Stop dispatching new work to an analyst. Its current task keeps running.
pub async fn lock_analyst(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let analyst = set_lock(&state, id, LockState::Locked).await?;
    Ok(Json(DataResponse { data: analyst }))
}

/// PUT /api/v1/analysts/{id}/unlock
pub async fn unlock_analyst(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let analyst = set_lock(&state, id, LockState::Unlocked).await?;
    Ok(Json(DataResponse { data: analyst }))
}
