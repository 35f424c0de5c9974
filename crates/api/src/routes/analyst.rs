//! Route definitions for analysts.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::analyst;
use crate::state::AppState;

/// Analyst-facing routes mounted at `/analyst`.
///
/// ```text
/// POST   /ping       -> ping
/// POST   /dequeue    -> dequeue
/// POST   /events     -> post_event
/// ```
pub fn analyst_router() -> Router<AppState> {
    Router::new()
        .route("/ping", post(analyst::ping))
        .route("/dequeue", post(analyst::dequeue))
        .route("/events", post(analyst::post_event))
}

/// Administration routes mounted at `/analysts`.
///
/// ```text
/// GET    /               -> list_analysts
/// GET    /{id}           -> get_analyst
/// PUT    /{id}/lock      -> lock_analyst
/// PUT    /{id}/unlock    -> unlock_analyst
/// ```
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(analyst::list_analysts))
        .route("/{id}", get(analyst::get_analyst))
        .route("/{id}/lock", put(analyst::lock_analyst))
        .route("/{id}/unlock", put(analyst::unlock_analyst))
}
