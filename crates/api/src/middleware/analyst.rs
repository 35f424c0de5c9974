//! Analyst identification extractor.

use assetflow_core::analyst::validate_endpoint;
use assetflow_core::error::CoreError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the analyst's own endpoint, e.g. `https://10.0.0.4:5000`.
pub const ANALYST_ENDPOINT_HEADER: &str = "x-analyst-endpoint";

/// The analyst making the request, identified by its endpoint.
///
/// Rejects with 401 when the header is missing or not valid UTF-8, and with
/// 400 when the endpoint fails validation.
///
/// ```ignore
/// async fn dequeue(analyst: AnalystEndpoint, State(state): State<AppState>) -> AppResult<...>
/// ```
#[derive(Debug, Clone)]
pub struct AnalystEndpoint(pub String);

impl FromRequestParts<AppState> for AnalystEndpoint {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let endpoint = parts
            .headers
            .get(ANALYST_ENDPOINT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(format!(
                    "Missing {ANALYST_ENDPOINT_HEADER} header"
                )))
            })?;

        validate_endpoint(endpoint)?;
        Ok(AnalystEndpoint(endpoint.to_string()))
    }
}
