//! Cluster lock row.

use assetflow_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `cluster_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClusterLock {
    pub name: String,
    pub host: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}
