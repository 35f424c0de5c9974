//! Pipeline module rows and DTOs.
//!
//! `ops` stays raw JSON here; `assetflow_pipeline` parses and validates it
//! into typed `ModOp` values when modules are loaded or written.

use assetflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `pipeline_mods` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PipelineModRow {
    pub id: DbId,
    pub project_id: Option<DbId>,
    pub name: String,
    pub description: String,
    pub provider: String,
    pub category: String,
    pub mod_type: String,
    pub supported_media: serde_json::Value,
    pub ops: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a pipeline module.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipelineMod {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub mod_type: String,
    #[serde(default)]
    pub supported_media: Vec<String>,
    pub ops: serde_json::Value,
    /// Create as a standard module visible to every project.
    #[serde(default)]
    pub standard: bool,
}

/// DTO for updating a pipeline module. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePipelineMod {
    pub description: Option<String>,
    pub provider: Option<String>,
    pub category: Option<String>,
    pub mod_type: Option<String>,
    pub supported_media: Option<Vec<String>>,
    pub ops: Option<serde_json::Value>,
}
