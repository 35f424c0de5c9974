//! Handlers for the `/pipeline-mods` resource.
//!
//! Module ops are validated on every write so a stored module always
//! parses at resolution time.

use assetflow_core::error::CoreError;
use assetflow_core::types::DbId;
use assetflow_db::models::pipeline_mod::{CreatePipelineMod, PipelineModRow, UpdatePipelineMod};
use assetflow_db::repositories::PipelineModRepo;
use assetflow_pipeline::model::parse_ops;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::engine::job_launcher::{preview, ResolveRequest};
use crate::error::{AppError, AppResult};
use crate::middleware::project::ProjectId;
use crate::response::DataResponse;
use crate::state::AppState;

const MAX_MOD_NAME_LEN: usize = 128;

async fn find_mod(pool: &sqlx::PgPool, project_id: DbId, id: DbId) -> AppResult<PipelineModRow> {
    PipelineModRepo::find_by_id(pool, project_id, id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("PipelineMod", id)))
}

fn validate_mod_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() || name.len() > MAX_MOD_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Pipeline module name must be 1-{MAX_MOD_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(
            "Pipeline module name must not contain whitespace".into(),
        ));
    }
    Ok(())
}

/// GET /api/v1/pipeline-mods
///
/// Modules visible to the project: its own plus the standard modules it
/// does not shadow.
pub async fn list_mods(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let mods = PipelineModRepo::list(&state.pool, project_id).await?;
    Ok(Json(DataResponse { data: mods }))
}

/// POST /api/v1/pipeline-mods
///
/// Returns 201, or 409 when the name is taken in the same scope.
pub async fn create_mod(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Json(input): Json<CreatePipelineMod>,
) -> AppResult<impl IntoResponse> {
    validate_mod_name(&input.name)?;
    parse_ops(&input.name, &input.ops)?;

    let row = PipelineModRepo::create(&state.pool, project_id, &input).await?;
    tracing::info!(
        mod_id = row.id,
        name = %row.name,
        standard = row.project_id.is_none(),
        "Pipeline module created",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: row })))
}

/// GET /api/v1/pipeline-mods/{id}
pub async fn get_mod(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let row = find_mod(&state.pool, project_id, id).await?;
    Ok(Json(DataResponse { data: row }))
}

/// PUT /api/v1/pipeline-mods/{id}
pub async fn update_mod(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdatePipelineMod>,
) -> AppResult<impl IntoResponse> {
    let existing = find_mod(&state.pool, project_id, id).await?;
    if let Some(ops) = &input.ops {
        parse_ops(&existing.name, ops)?;
    }

    let row = PipelineModRepo::update(&state.pool, project_id, id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("PipelineMod", id)))?;
    tracing::info!(mod_id = id, name = %row.name, "Pipeline module updated");
    Ok(Json(DataResponse { data: row }))
}

/// DELETE /api/v1/pipeline-mods/{id}
///
/// Returns 204. Jobs already launched keep their resolved pipelines.
pub async fn delete_mod(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !PipelineModRepo::delete(&state.pool, project_id, id).await? {
        return Err(AppError::Core(CoreError::not_found("PipelineMod", id)));
    }
    tracing::info!(mod_id = id, "Pipeline module deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/pipeline-mods/resolve
///
/// Resolve modules into a pipeline without creating a job.
pub async fn resolve_mods(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> AppResult<impl IntoResponse> {
    let resolved = preview(&state.pool, project_id, &request).await?;
    Ok(Json(DataResponse { data: resolved }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_name_rules() {
        assert!(validate_mod_name("clip-labels").is_ok());
        assert!(validate_mod_name("").is_err());
        assert!(validate_mod_name("two words").is_err());
        assert!(validate_mod_name(&"m".repeat(129)).is_err());
    }
}
