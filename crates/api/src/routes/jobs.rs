//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                     -> list_jobs
/// POST   /                     -> create_job
/// GET    /{id}                 -> get_job
/// PUT    /{id}                 -> update_job
/// POST   /{id}/cancel          -> cancel_job
/// POST   /{id}/restart         -> restart_job
/// POST   /{id}/archive         -> archive_job
/// POST   /{id}/retry-failures  -> retry_failures
/// GET    /{id}/tasks           -> list_tasks
/// POST   /{id}/tasks           -> add_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route("/{id}", get(jobs::get_job).put(jobs::update_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/restart", post(jobs::restart_job))
        .route("/{id}/archive", post(jobs::archive_job))
        .route("/{id}/retry-failures", post(jobs::retry_failures))
        .route("/{id}/tasks", get(jobs::list_tasks).post(jobs::add_task))
}
