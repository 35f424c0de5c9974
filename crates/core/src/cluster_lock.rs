//! Cluster lock names and validation.
//!
//! Maintenance loops that must run on a single replica at a time take one of
//! these locks before doing any work.

use crate::error::CoreError;

/// Lock guarding the analyst/task reclaim sweep.
pub const LOCK_RECLAIM: &str = "reclaim-tasks";

/// Lock guarding the expired-pause sweep.
pub const LOCK_PAUSE_EXPIRY: &str = "pause-expiry";

/// Default lifetime of a maintenance lock in seconds. A crashed holder's
/// lock is cleared after this long.
pub const DEFAULT_LOCK_DURATION_SECS: u64 = 60;

/// How often expired locks are cleared.
pub const LOCK_REAPER_INTERVAL_SECS: u64 = 60;

const MAX_LOCK_NAME_LEN: usize = 128;

/// Validate a lock name and duration.
pub fn validate_lock(name: &str, duration_secs: u64) -> Result<(), CoreError> {
    if name.is_empty() || name.len() > MAX_LOCK_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Lock name must be 1-{MAX_LOCK_NAME_LEN} characters"
        )));
    }
    if duration_secs == 0 {
        return Err(CoreError::Validation(
            "Lock duration must be positive".to_string(),
        ));
    }
    Ok(())
}
