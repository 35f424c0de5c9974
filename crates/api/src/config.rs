use std::str::FromStr;

use assetflow_core::analyst::{ANALYST_TIMEOUT_SECS, RECLAIM_INTERVAL_SECS};
use assetflow_core::cluster_lock::LOCK_REAPER_INTERVAL_SECS;
use assetflow_core::scheduling::{DEFAULT_DISPATCH_POLL_COUNT, DEFAULT_RETRY_LIMIT};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background loops get to stop after the server drains.
    pub shutdown_timeout_secs: u64,
    /// Emit logs as JSON lines instead of human-readable text.
    pub log_json: bool,
    /// Scheduler and maintenance loop settings.
    pub scheduler: SchedulerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `LOG_FORMAT`           | `text` (`json` for JSON)   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port: env_or("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            log_json: std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            scheduler: SchedulerConfig::from_env(),
        }
    }
}

/// Dispatch, retry and maintenance settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name this replica records as the holder of cluster locks.
    pub host: String,
    /// Failed attempts allowed before a task stays in `Failure`.
    pub task_retry_limit: i32,
    /// Seconds without a ping before an analyst is considered down.
    pub analyst_timeout_secs: u64,
    pub reclaim_interval_secs: u64,
    pub lock_reaper_interval_secs: u64,
    pub pause_expiry_interval_secs: u64,
    /// Page size of the dispatch ranking query.
    pub dispatch_poll_count: i64,
}

impl SchedulerConfig {
    /// Load scheduler settings from environment variables with defaults.
    ///
    /// | Env Var                      | Default                      |
    /// |------------------------------|------------------------------|
    /// | `SCHEDULER_HOST`             | `HOSTNAME`, else `localhost` |
    /// | `TASK_RETRY_LIMIT`           | `3`                          |
    /// | `ANALYST_TIMEOUT_SECS`       | `120`                        |
    /// | `RECLAIM_INTERVAL_SECS`      | `30`                         |
    /// | `LOCK_REAPER_INTERVAL_SECS`  | `60`                         |
    /// | `PAUSE_EXPIRY_INTERVAL_SECS` | `30`                         |
    /// | `DISPATCH_POLL_COUNT`        | `5`                          |
    pub fn from_env() -> Self {
        let host = std::env::var("SCHEDULER_HOST")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "localhost".into());

        let config = Self {
            host,
            task_retry_limit: env_or("TASK_RETRY_LIMIT", DEFAULT_RETRY_LIMIT),
            analyst_timeout_secs: env_or("ANALYST_TIMEOUT_SECS", ANALYST_TIMEOUT_SECS),
            reclaim_interval_secs: env_or("RECLAIM_INTERVAL_SECS", RECLAIM_INTERVAL_SECS),
            lock_reaper_interval_secs: env_or(
                "LOCK_REAPER_INTERVAL_SECS",
                LOCK_REAPER_INTERVAL_SECS,
            ),
            pause_expiry_interval_secs: env_or("PAUSE_EXPIRY_INTERVAL_SECS", 30),
            dispatch_poll_count: env_or("DISPATCH_POLL_COUNT", DEFAULT_DISPATCH_POLL_COUNT),
        };

        assert!(config.task_retry_limit >= 0, "TASK_RETRY_LIMIT must not be negative");
        assert!(config.dispatch_poll_count > 0, "DISPATCH_POLL_COUNT must be positive");
        config
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            task_retry_limit: DEFAULT_RETRY_LIMIT,
            analyst_timeout_secs: ANALYST_TIMEOUT_SECS,
            reclaim_interval_secs: RECLAIM_INTERVAL_SECS,
            lock_reaper_interval_secs: LOCK_REAPER_INTERVAL_SECS,
            pause_expiry_interval_secs: 30,
            dispatch_poll_count: DEFAULT_DISPATCH_POLL_COUNT,
        }
    }
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// Panics on a value that does not parse; configuration errors should stop
/// the process at startup.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value, got '{raw}': {e}")),
        Err(_) => default,
    }
}
