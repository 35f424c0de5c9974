//! Domain errors shared by every crate in the workspace.

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A job, task, analyst or module that does not exist or lies outside
    /// the caller's project.
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The entity exists but is in the wrong state for the request, e.g.
    /// restarting a job that was never cancelled.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A status id read from the database that no status enum knows.
    #[error("Unknown {kind} id: {id}")]
    InvalidStatus { kind: &'static str, id: i16 },

    /// The caller did not identify itself.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        CoreError::NotFound { entity, id }
    }
}
