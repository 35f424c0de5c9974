use std::sync::Arc;

use crate::config::{SchedulerConfig, ServerConfig};

/// State handed to every handler through `State<AppState>`.
///
/// The background loops do not see it; they receive the pool and a copy of
/// [`SchedulerConfig`] when spawned.
#[derive(Clone)]
pub struct AppState {
    pub pool: assetflow_db::DbPool,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Retry, timeout and dispatch settings used by the engine.
    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.config.scheduler
    }
}
