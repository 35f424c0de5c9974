//! Route definitions for the `/tasks` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Routes mounted at `/tasks`.
///
/// ```text
/// GET    /{id}           -> get_task
/// GET    /{id}/script    -> get_task_script
/// GET    /{id}/errors    -> list_task_errors
/// POST   /{id}/retry     -> retry_task
/// POST   /{id}/skip      -> skip_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/script", get(tasks::get_task_script))
        .route("/{id}/errors", get(tasks::list_task_errors))
        .route("/{id}/retry", post(tasks::retry_task))
        .route("/{id}/skip", post(tasks::skip_task))
}
