//! Job creation.
//!
//! A job is launched in two phases. First every script's pipeline is
//! resolved in memory; any configuration error stops the launch here.
//! Only then are the job, its dependency edges and its tasks inserted in
//! one transaction, so a rejected launch never leaves a partial job behind.

use std::collections::BTreeMap;

use assetflow_core::error::CoreError;
use assetflow_core::scheduling::{
    validate_job_name, validate_max_running_tasks, DEFAULT_MAX_RUNNING_TASKS, PRIORITY_STANDARD,
};
use assetflow_core::types::{ArgMap, DbId};
use assetflow_core::zps::{validate_script, ProcessorRef, ZpsScript};
use assetflow_db::models::job::{CreateJob, Job};
use assetflow_db::models::task::{NewTask, Task};
use assetflow_db::repositories::JobRepo;
use assetflow_pipeline::loader::load_catalog;
use assetflow_pipeline::{resolve, resolve_custom, ModuleCatalog, PipelineError, ResolvedPipeline, Seed};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    PRIORITY_STANDARD
}

fn default_max_running_tasks() -> i32 {
    DEFAULT_MAX_RUNNING_TASKS
}

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub name: String,
    /// One task is created per script.
    pub scripts: Vec<ZpsScript>,
    /// Pipeline modules applied, in order, to every script.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Seed scripts without their own `execute` list with the standard
    /// pipeline.
    #[serde(default = "default_true")]
    pub include_standard: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_max_running_tasks")]
    pub max_running_tasks: i32,
    /// Jobs that must finish before any task of this job is dispatched.
    #[serde(default)]
    pub depend_on_job_ids: Vec<DbId>,
    #[serde(default)]
    pub paused: bool,
    /// Lift the pause automatically after this many seconds.
    pub pause_duration_secs: Option<i64>,
    #[serde(default)]
    pub args: ArgMap,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Request body for `POST /api/v1/pipeline-mods/resolve`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub modules: Vec<String>,
    /// Custom processors to resolve over instead of a stock seed.
    #[serde(default)]
    pub seed: Vec<ProcessorRef>,
    #[serde(default = "default_true")]
    pub include_standard: bool,
}

/// A launched job with the tasks created for it.
#[derive(Debug, Serialize)]
pub struct LaunchedJob {
    #[serde(flatten)]
    pub job: Job,
    pub tasks: Vec<Task>,
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Pick the starting pipeline for one script.
fn seed_for(execute: &[ProcessorRef], include_standard: bool) -> Seed {
    if !execute.is_empty() {
        Seed::Custom(execute.to_vec())
    } else if include_standard {
        Seed::Standard
    } else {
        Seed::Empty
    }
}

/// Resolve the pipeline one script will run.
///
/// With modules, the script's own `execute` list (or the standard pipeline)
/// is the seed the modules are applied over. Without modules, a custom
/// `execute` list is sealed as given.
pub fn resolve_script_pipeline(
    catalog: &ModuleCatalog,
    modules: &[String],
    execute: &[ProcessorRef],
    include_standard: bool,
) -> Result<ResolvedPipeline, PipelineError> {
    if modules.is_empty() && !execute.is_empty() {
        return Ok(resolve_custom(execute));
    }
    resolve(catalog, seed_for(execute, include_standard), modules)
}

/// Resolve `script` in place: replace its `execute` list, merge the
/// resolved global args over its own, and seal every processor.
fn apply_resolution(script: &mut ZpsScript, resolved: ResolvedPipeline) {
    script.execute = resolved.execute;
    script.global_args.extend(resolved.global_args);
    script.seal();
}

/// Resolve a pipeline without launching anything.
pub async fn preview(
    pool: &PgPool,
    project_id: DbId,
    request: &ResolveRequest,
) -> AppResult<ResolvedPipeline> {
    let catalog = load_catalog(pool, project_id, &request.modules).await?;
    Ok(resolve_script_pipeline(
        &catalog,
        &request.modules,
        &request.seed,
        request.include_standard,
    )?)
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

fn validate_spec(spec: &JobSpec) -> Result<(), CoreError> {
    validate_job_name(&spec.name)?;
    validate_max_running_tasks(spec.max_running_tasks)?;
    if spec.scripts.is_empty() {
        return Err(CoreError::Validation(
            "Job must contain at least one script".into(),
        ));
    }
    spec.scripts.iter().try_for_each(validate_script)?;
    if let Some(secs) = spec.pause_duration_secs {
        if secs <= 0 {
            return Err(CoreError::Validation(format!(
                "pause_duration_secs must be positive, got {secs}"
            )));
        }
    }
    if spec.pause_duration_secs.is_some() && !spec.paused {
        return Err(CoreError::Validation(
            "pause_duration_secs requires paused = true".into(),
        ));
    }
    Ok(())
}

/// Validate, resolve and persist a job.
pub async fn launch(pool: &PgPool, project_id: DbId, spec: JobSpec) -> AppResult<LaunchedJob> {
    validate_spec(&spec)?;

    let missing = JobRepo::find_missing(pool, &spec.depend_on_job_ids).await?;
    if let Some(id) = missing.first() {
        return Err(AppError::Core(CoreError::not_found("Job", *id)));
    }

    let catalog = if spec.modules.is_empty() {
        ModuleCatalog::new()
    } else {
        load_catalog(pool, project_id, &spec.modules).await?
    };

    let mut tasks = Vec::with_capacity(spec.scripts.len());
    for mut script in spec.scripts {
        let resolved = resolve_script_pipeline(
            &catalog,
            &spec.modules,
            &script.execute,
            spec.include_standard,
        )?;
        apply_resolution(&mut script, resolved);
        tasks.push(NewTask {
            name: script.name.clone(),
            script,
        });
    }

    let pause_expires_at = spec
        .pause_duration_secs
        .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));

    let input = CreateJob {
        project_id,
        name: spec.name.trim().to_string(),
        priority: spec.priority,
        paused: spec.paused,
        pause_expires_at,
        max_running_tasks: spec.max_running_tasks,
        args: spec.args,
        env: spec.env,
    };

    let (job, tasks) =
        JobRepo::create_with_tasks(pool, &input, &tasks, &spec.depend_on_job_ids).await?;

    tracing::info!(
        job_id = job.id,
        project_id,
        tasks = tasks.len(),
        modules = spec.modules.len(),
        priority = job.priority,
        "Job launched",
    );

    Ok(LaunchedJob { job, tasks })
}
