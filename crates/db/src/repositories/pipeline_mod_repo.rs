//! Repository for the `pipeline_mods` table.
//!
//! A `NULL` project marks a standard module. Lookups by name prefer the
//! project's own module over a standard one with the same name.

use assetflow_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::pipeline_mod::{CreatePipelineMod, PipelineModRow, UpdatePipelineMod};

/// Column list for `pipeline_mods` queries.
const COLUMNS: &str = "\
    id, project_id, name, description, provider, category, mod_type, \
    supported_media, ops, created_at, updated_at";

/// Provides persistence for pipeline modules.
pub struct PipelineModRepo;

impl PipelineModRepo {
    /// Insert a module for `project_id`, or a standard module when
    /// `input.standard` is set.
    pub async fn create(
        pool: &PgPool,
        project_id: DbId,
        input: &CreatePipelineMod,
    ) -> Result<PipelineModRow, sqlx::Error> {
        let owner = (!input.standard).then_some(project_id);
        let query = format!(
            "INSERT INTO pipeline_mods \
                 (project_id, name, description, provider, category, mod_type, supported_media, ops) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PipelineModRow>(&query)
            .bind(owner)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.provider)
            .bind(&input.category)
            .bind(&input.mod_type)
            .bind(Json(&input.supported_media))
            .bind(&input.ops)
            .fetch_one(pool)
            .await
    }

    /// Find a module visible to `project_id` by its internal ID.
    pub async fn find_by_id(
        pool: &PgPool,
        project_id: DbId,
        id: DbId,
    ) -> Result<Option<PipelineModRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pipeline_mods \
             WHERE id = $1 AND (project_id = $2 OR project_id IS NULL)"
        );
        sqlx::query_as::<_, PipelineModRow>(&query)
            .bind(id)
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    /// Resolve module names for a project, one row per name found.
    ///
    /// When both a project module and a standard module carry the same name,
    /// only the project module is returned. Missing names are simply absent.
    pub async fn find_by_names(
        pool: &PgPool,
        project_id: DbId,
        names: &[String],
    ) -> Result<Vec<PipelineModRow>, sqlx::Error> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT DISTINCT ON (name) {COLUMNS} FROM pipeline_mods \
             WHERE name = ANY($1) AND (project_id = $2 OR project_id IS NULL) \
             ORDER BY name, project_id NULLS LAST"
        );
        sqlx::query_as::<_, PipelineModRow>(&query)
            .bind(names)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// List modules visible to a project, project modules shadowing standard
    /// ones, ordered by name.
    pub async fn list(pool: &PgPool, project_id: DbId) -> Result<Vec<PipelineModRow>, sqlx::Error> {
        let query = format!(
            "SELECT DISTINCT ON (name) {COLUMNS} FROM pipeline_mods \
             WHERE project_id = $1 OR project_id IS NULL \
             ORDER BY name, project_id NULLS LAST"
        );
        sqlx::query_as::<_, PipelineModRow>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Apply a partial update. Returns `None` if no module visible to the
    /// project has that ID.
    pub async fn update(
        pool: &PgPool,
        project_id: DbId,
        id: DbId,
        input: &UpdatePipelineMod,
    ) -> Result<Option<PipelineModRow>, sqlx::Error> {
        let query = format!(
            "UPDATE pipeline_mods SET \
                 description = COALESCE($3, description), \
                 provider = COALESCE($4, provider), \
                 category = COALESCE($5, category), \
                 mod_type = COALESCE($6, mod_type), \
                 supported_media = COALESCE($7, supported_media), \
                 ops = COALESCE($8, ops) \
             WHERE id = $1 AND (project_id = $2 OR project_id IS NULL) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PipelineModRow>(&query)
            .bind(id)
            .bind(project_id)
            .bind(&input.description)
            .bind(&input.provider)
            .bind(&input.category)
            .bind(&input.mod_type)
            .bind(input.supported_media.as_ref().map(Json))
            .bind(&input.ops)
            .fetch_optional(pool)
            .await
    }

    /// Delete a module. Returns `false` if none visible to the project has
    /// that ID.
    pub async fn delete(pool: &PgPool, project_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM pipeline_mods \
             WHERE id = $1 AND (project_id = $2 OR project_id IS NULL)",
        )
        .bind(id)
        .bind(project_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
