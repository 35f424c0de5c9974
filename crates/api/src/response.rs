//! The `{ "data": ... }` envelope every successful response uses.

use serde::Serialize;

/// Success envelope. `data` may be `null`, e.g. when a dequeue finds
/// nothing to run; errors use `{ "error", "code" }` instead (see
/// [`crate::error::AppError`]).
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
