//! Project scope extractor.

use assetflow_core::types::DbId;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Header selecting the project a request operates on.
pub const PROJECT_ID_HEADER: &str = "x-project-id";

/// Project used when the header is absent.
pub const DEFAULT_PROJECT_ID: DbId = 1;

/// Project scope of the request. Projects live outside this service, so
/// the id is taken as given.
#[derive(Debug, Clone, Copy)]
pub struct ProjectId(pub DbId);

impl FromRequestParts<AppState> for ProjectId {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(PROJECT_ID_HEADER) else {
            return Ok(ProjectId(DEFAULT_PROJECT_ID));
        };

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<DbId>().ok())
            .filter(|id| *id > 0)
            .map(ProjectId)
            .ok_or_else(|| {
                AppError::BadRequest(format!("{PROJECT_ID_HEADER} must be a positive integer"))
            })
    }
}
