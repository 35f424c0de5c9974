pub mod analyst;
pub mod health;
pub mod jobs;
pub mod pipeline_mods;
pub mod tasks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /analyst                                  ping, dequeue, events
/// /analysts                                 list, get, lock, unlock
/// /jobs                                     launch, list, overrides, tasks
/// /tasks/{id}                               read, retry, skip
/// /pipeline-mods                            module CRUD, resolve preview
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/analyst", analyst::analyst_router())
        .nest("/analysts", analyst::admin_router())
        .nest("/jobs", jobs::router())
        .nest("/tasks", tasks::router())
        .nest("/pipeline-mods", pipeline_mods::router())
}
