use assetflow_core::status::AnalystState;
use assetflow_db::repositories::AnalystRepo;
use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the database is unreachable.
    pub status: &'static str,
    pub version: &'static str,
    /// Holder name this replica uses for cluster locks.
    pub scheduler_host: String,
    pub db_healthy: bool,
    /// Analysts currently able to take work; absent when the database is down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysts_up: Option<i64>,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let analysts_up = match assetflow_db::health_check(&state.pool).await {
        Ok(()) => AnalystRepo::count_in_state(&state.pool, AnalystState::Up)
            .await
            .ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            None
        }
    };
    let db_healthy = analysts_up.is_some();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        scheduler_host: state.scheduler().host.clone(),
        db_healthy,
        analysts_up,
    })
}

/// Mounted at the root, outside `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
