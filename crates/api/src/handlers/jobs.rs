//! Handlers for the `/jobs` resource.
//!
//! Every endpoint is scoped to the [`ProjectId`] of the request; a job in
//! another project is reported as not found.

use assetflow_core::error::CoreError;
use assetflow_core::scheduling::{validate_job_name, validate_max_running_tasks};
use assetflow_core::status::JobState;
use assetflow_core::types::DbId;
use assetflow_core::zps::validate_script;
use assetflow_db::models::job::{Job, JobDetail, JobListQuery, UpdateJob};
use assetflow_db::models::task::{CreateTask, TaskListQuery};
use assetflow_db::repositories::{JobRepo, TaskRepo};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::engine::job_launcher::{launch, JobSpec};
use crate::engine::lifecycle::{release_job_dependers, settle_job};
use crate::error::{AppError, AppResult};
use crate::handlers::tasks::find_task;
use crate::middleware::project::ProjectId;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID within the caller's project.
pub(crate) async fn find_job(pool: &sqlx::PgPool, project_id: DbId, job_id: DbId) -> AppResult<Job> {
    JobRepo::find_by_id(pool, job_id)
        .await?
        .filter(|job| job.project_id == project_id)
        .ok_or(AppError::Core(CoreError::not_found("Job", job_id)))
}

async fn job_detail(pool: &sqlx::PgPool, job: Job) -> AppResult<JobDetail> {
    let task_counts = JobRepo::task_counts(pool, job.id).await?.unwrap_or_default();
    Ok(JobDetail { job, task_counts })
}

/// Compare-and-swap a job override, mapping a lost race to 409.
async fn transition(
    pool: &sqlx::PgPool,
    job: &Job,
    from: JobState,
    to: JobState,
) -> AppResult<()> {
    if !JobRepo::try_transition(pool, job.id, from, to).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {} must be {from} to become {to}",
            job.id
        ))));
    }
    tracing::info!(job_id = job.id, from = %from, to = %to, "Job state changed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Create / read
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Resolve every script's pipeline and create the job with one task per
/// script. Returns 201 with the job and its tasks.
pub async fn create_job(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Json(spec): Json<JobSpec>,
) -> AppResult<impl IntoResponse> {
    let launched = launch(&state.pool, project_id, spec).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: launched })))
}

/// GET /api/v1/jobs
///
/// Supports optional `state_id`, `limit`, and `offset` query parameters.
pub async fn list_jobs(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, project_id, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
///
/// The job with its per-state task counts.
pub async fn get_job(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, project_id, job_id).await?;
    let detail = job_detail(&state.pool, job).await?;
    Ok(Json(DataResponse { data: detail }))
}

/// PUT /api/v1/jobs/{id}
pub async fn update_job(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<UpdateJob>,
) -> AppResult<impl IntoResponse> {
    if let Some(name) = &input.name {
        validate_job_name(name)?;
    }
    if let Some(max) = input.max_running_tasks {
        validate_max_running_tasks(max)?;
    }
    if let Some(secs) = input.pause_duration_secs {
        if secs <= 0 {
            return Err(AppError::Core(CoreError::Validation(format!(
                "pause_duration_secs must be positive, got {secs}"
            ))));
        }
    }

    find_job(&state.pool, project_id, job_id).await?;
    let job = JobRepo::update(&state.pool, job_id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Job", job_id)))?;

    tracing::info!(job_id, paused = job.paused, priority = job.priority, "Job updated");
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Stop dispatching the job. Tasks already running finish normally; jobs
/// waiting on this one are released.
pub async fn cancel_job(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, project_id, job_id).await?;
    transition(&state.pool, &job, JobState::InProgress, JobState::Cancelled).await?;
    release_job_dependers(&state.pool, job_id).await?;

    let job = find_job(&state.pool, project_id, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/restart
///
/// Resume a cancelled job. Its state is re-derived from its tasks right
/// away, so a job whose tasks all finished goes straight to a final state.
pub async fn restart_job(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, project_id, job_id).await?;
    transition(&state.pool, &job, JobState::Cancelled, JobState::InProgress).await?;
    settle_job(&state.pool, job_id).await?;

    let job = find_job(&state.pool, project_id, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/archive
pub async fn archive_job(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, project_id, job_id).await?;
    if !JobRepo::archive(&state.pool, job_id).await? {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} must be finished before it can be archived"
        ))));
    }
    tracing::info!(job_id, "Job archived");

    let job = find_job(&state.pool, project_id, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

#[derive(Debug, Serialize)]
pub struct RetriedTasks {
    pub task_ids: Vec<DbId>,
}

/// POST /api/v1/jobs/{id}/retry-failures
///
/// Requeue every failed task of the job with a fresh retry budget.
pub async fn retry_failures(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, project_id, job_id).await?;
    if matches!(job.state()?, JobState::Cancelled | JobState::Archived) {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} is {} and cannot be retried",
            job.state()?
        ))));
    }

    let task_ids = TaskRepo::retry_failures(&state.pool, job_id).await?;
    if !task_ids.is_empty() {
        settle_job(&state.pool, job_id).await?;
        tracing::info!(job_id, retried = task_ids.len(), "Failed tasks requeued");
    }
    Ok(Json(DataResponse {
        data: RetriedTasks { task_ids },
    }))
}

// ---------------------------------------------------------------------------
// Tasks of a job
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/tasks
pub async fn list_tasks(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Query(params): Query<TaskListQuery>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, project_id, job_id).await?;
    let tasks = TaskRepo::list_by_job(&state.pool, job_id, &params).await?;
    Ok(Json(DataResponse { data: tasks }))
}

/// POST /api/v1/jobs/{id}/tasks
///
/// Add a task to a running job. The script is sealed as given; it starts
/// in `Depend` when it waits on unfinished tasks or its job waits on
/// unfinished jobs.
pub async fn add_task(
    ProjectId(project_id): ProjectId,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(mut input): Json<CreateTask>,
) -> AppResult<impl IntoResponse> {
    if input.name.trim().is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Task name must not be empty".into(),
        )));
    }
    validate_script(&input.script)?;

    let job = find_job(&state.pool, project_id, job_id).await?;
    if job.state()? != JobState::InProgress {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Job {job_id} is {} and does not accept new tasks",
            job.state()?
        ))));
    }
    for dependee in &input.depend_on_task_ids {
        find_task(&state.pool, project_id, *dependee).await?;
    }

    input.script.seal();
    let task = TaskRepo::create(&state.pool, job.id, job.project_id, &input).await?;

    tracing::info!(
        task_id = task.id,
        job_id,
        depends = input.depend_on_task_ids.len(),
        "Task added",
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}
