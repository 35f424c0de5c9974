//! Loads the modules a resolution needs from the database.

use std::collections::BTreeSet;

use assetflow_core::types::DbId;
use assetflow_db::repositories::PipelineModRepo;
use sqlx::PgPool;

use crate::error::PipelineError;
use crate::model::PipelineMod;
use crate::resolver::ModuleCatalog;

/// Build the catalog for `names`: the named modules plus the transitive
/// closure of their `DEPEND` targets, as visible to `project_id`.
///
/// Fetches one breadth-first level per query. Any name that cannot be found
/// at any depth fails the whole load.
pub async fn load_catalog(
    pool: &PgPool,
    project_id: DbId,
    names: &[String],
) -> Result<ModuleCatalog, PipelineError> {
    let mut catalog = ModuleCatalog::new();
    let mut pending: BTreeSet<String> = names.iter().cloned().collect();

    while !pending.is_empty() {
        let wanted: Vec<String> = pending.iter().cloned().collect();
        let rows = PipelineModRepo::find_by_names(pool, project_id, &wanted).await?;

        let mut next = BTreeSet::new();
        for row in &rows {
            let module = PipelineMod::try_from(row)?;
            pending.remove(&module.name);
            for dependency in module.dependencies() {
                if !catalog.contains(dependency) && !wanted.contains(dependency) {
                    next.insert(dependency.clone());
                }
            }
            catalog.insert(module);
        }

        if let Some(missing) = pending.into_iter().next() {
            return Err(PipelineError::UnknownModule(missing));
        }
        pending = next;
    }

    tracing::debug!(project_id, modules = catalog.len(), "Pipeline catalog loaded");
    Ok(catalog)
}
