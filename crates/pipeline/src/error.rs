/// Configuration errors raised while loading or resolving pipeline modules.
///
/// Every variant except `Database` means the request itself is invalid; a
/// resolution that fails never yields a partial pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unknown pipeline module: {0}")]
    UnknownModule(String),

    #[error("Pipeline module dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Invalid filter in module '{module}': {reason}")]
    InvalidFilter { module: String, reason: String },

    #[error("Invalid {op} payload in module '{module}': {reason}")]
    InvalidPayload {
        module: String,
        /// The op type, or `ops[i]` when the entry could not be decoded.
        op: String,
        reason: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
