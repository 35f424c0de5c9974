//! Route definitions for the `/pipeline-mods` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::pipeline_mods;
use crate::state::AppState;

/// Routes mounted at `/pipeline-mods`.
///
/// ```text
/// GET    /          -> list_mods
/// POST   /          -> create_mod
/// POST   /resolve   -> resolve_mods
/// GET    /{id}      -> get_mod
/// PUT    /{id}      -> update_mod
/// DELETE /{id}      -> delete_mod
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(pipeline_mods::list_mods).post(pipeline_mods::create_mod),
        )
        .route("/resolve", post(pipeline_mods::resolve_mods))
        .route(
            "/{id}",
            get(pipeline_mods::get_mod)
                .put(pipeline_mods::update_mod)
                .delete(pipeline_mods::delete_mod),
        )
}
