//! HTTP error mapping.
//!
//! Handlers return [`AppResult`]; whatever goes wrong becomes a JSON body
//! `{"error": "...", "code": "..."}` with a matching status. Internal
//! details are logged and never sent to the client.

use assetflow_core::error::CoreError;
use assetflow_pipeline::PipelineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `assetflow_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A pipeline module load or resolution error.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// Status, machine-readable code and client-facing message.
type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Pipeline(PipelineError::Database(err)) | AppError::Database(err) => {
                classify_sqlx_error(err)
            }
            AppError::Pipeline(err) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal_error()
            }
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> Classified {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::InvalidStatus { .. } | CoreError::Internal(_) => {
            tracing::error!(error = %err, "Internal core error");
            internal_error()
        }
    }
}

/// Map the Postgres conditions a client can cause onto 4xx responses.
///
/// | SQLSTATE        | Status | Condition                              |
/// |-----------------|--------|----------------------------------------|
/// | `23505`         | 409    | unique violation on a `uq_` constraint |
/// | `23503`         | 404    | referenced row does not exist          |
/// | `40001`/`40P01` | 409    | serialization failure or deadlock      |
///
/// `RowNotFound` is a 404; anything else is a sanitized 500.
fn classify_sqlx_error(err: &sqlx::Error) -> Classified {
    let db_err = match err {
        sqlx::Error::RowNotFound => {
            return (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found".to_string())
        }
        sqlx::Error::Database(db_err) => db_err,
        other => {
            tracing::error!(error = %other, "Database error");
            return internal_error();
        }
    };

    let constraint = db_err.constraint().unwrap_or("unknown");
    match db_err.code().as_deref() {
        Some("23505") if constraint.starts_with("uq_") => (
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Duplicate value violates unique constraint: {constraint}"),
        ),
        Some("23503") => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Referenced row does not exist: {constraint}"),
        ),
        Some("40001" | "40P01") => {
            tracing::warn!(error = %db_err, "Concurrent update conflict");
            (
                StatusCode::CONFLICT,
                "CONFLICT",
                "Concurrent update, retry the request".to_string(),
            )
        }
        _ => {
            tracing::error!(error = %db_err, "Database error");
            internal_error()
        }
    }
}

fn internal_error() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
