//! Analyst heartbeat constants and validation.
//!
//! Pure functions shared by the ping handler and the reclaim sweep.

use chrono::Duration;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// If an analyst has not pinged within this many seconds it is considered
/// down and its dispatched task is reclaimed.
pub const ANALYST_TIMEOUT_SECS: u64 = 120;

/// How often the reclaim sweep checks for stale analysts.
pub const RECLAIM_INTERVAL_SECS: u64 = 30;

/// Maximum length of an analyst endpoint.
const MAX_ENDPOINT_LEN: usize = 255;

/// Maximum length of an analyst version string.
const MAX_VERSION_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

/// Cut-off timestamp: analysts whose last ping is older are stale.
pub fn stale_cutoff(now: Timestamp, timeout_secs: u64) -> Timestamp {
    now - Duration::seconds(timeout_secs as i64)
}

/// Whether a ping at `last_ping_at` is older than the timeout.
pub fn is_stale(last_ping_at: Timestamp, now: Timestamp, timeout_secs: u64) -> bool {
    last_ping_at < stale_cutoff(now, timeout_secs)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an analyst endpoint (e.g. `https://10.0.0.4:5000`).
pub fn validate_endpoint(endpoint: &str) -> Result<(), CoreError> {
    if endpoint.trim().is_empty() {
        return Err(CoreError::Validation(
            "Analyst endpoint must not be empty".to_string(),
        ));
    }
    if endpoint.len() > MAX_ENDPOINT_LEN {
        return Err(CoreError::Validation(format!(
            "Analyst endpoint must not exceed {MAX_ENDPOINT_LEN} characters"
        )));
    }
    if endpoint.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation(
            "Analyst endpoint must not contain whitespace".to_string(),
        ));
    }
    Ok(())
}

/// Validate the resource metrics reported by a ping.
pub fn validate_metrics(
    total_ram_mb: i64,
    free_ram_mb: i64,
    free_disk_mb: i64,
    load: f64,
) -> Result<(), CoreError> {
    if total_ram_mb < 0 || free_ram_mb < 0 || free_disk_mb < 0 {
        return Err(CoreError::Validation(
            "Analyst memory and disk metrics must be non-negative".to_string(),
        ));
    }
    if free_ram_mb > total_ram_mb {
        return Err(CoreError::Validation(format!(
            "free_ram_mb ({free_ram_mb}) exceeds total_ram_mb ({total_ram_mb})"
        )));
    }
    if !load.is_finite() || load < 0.0 {
        return Err(CoreError::Validation(format!(
            "load must be a non-negative number, got {load}"
        )));
    }
    Ok(())
}

/// Validate an analyst version string.
pub fn validate_version(version: &str) -> Result<(), CoreError> {
    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(CoreError::Validation(format!(
            "Analyst version must be 1-{MAX_VERSION_LEN} characters"
        )));
    }
    Ok(())
}
