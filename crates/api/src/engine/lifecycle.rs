//! Analyst lifecycle events.
//!
//! Analysts report what happens to a task as a stream of events. Every
//! handler is a conditional write, so a redelivered or stale event changes
//! nothing and is acknowledged with `applied: false`.

use assetflow_core::error::CoreError;
use assetflow_core::hashing::sha256_json;
use assetflow_core::scheduling::{counts_as_failed_attempt, stopped_outcome, validate_progress};
use assetflow_core::status::TaskState;
use assetflow_core::types::DbId;
use assetflow_core::zps::AssetSpec;
use assetflow_db::models::task::Task;
use assetflow_db::models::task_error::CreateTaskError;
use assetflow_db::repositories::{AnalystRepo, DependRepo, JobRepo, TaskErrorRepo, TaskRepo};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};

/// Exit status recorded when a fatal ERROR ends an attempt.
pub const FATAL_EXIT_STATUS: i32 = -1;

// ---------------------------------------------------------------------------
// Event model
// ---------------------------------------------------------------------------

/// Event kinds an analyst can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskEventType {
    Started,
    Progress,
    Status,
    Stopped,
    Expand,
    Error,
}

/// Request body for `POST /api/v1/analyst/events`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEvent {
    pub task_id: DbId,
    pub job_id: DbId,
    #[serde(rename = "type")]
    pub event_type: TaskEventType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ProgressPayload {
    pub progress: i32,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct StoppedPayload {
    pub exit_status: i32,
    #[serde(default)]
    pub message: Option<String>,
    /// Analyst-side override, e.g. `Skipped` after a kill.
    #[serde(default)]
    pub new_state: Option<TaskState>,
}

#[derive(Debug, Deserialize)]
pub struct ExpandPayload {
    pub assets: Vec<AssetSpec>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub message: String,
    #[serde(default)]
    pub processor: Option<String>,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub stack: Option<serde_json::Value>,
}

/// Acknowledgement returned for every event.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventAck {
    /// Whether the event changed anything.
    pub applied: bool,
    /// Child task created by an EXPAND event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_task_id: Option<DbId>,
}

impl EventAck {
    fn applied(applied: bool) -> Self {
        Self {
            applied,
            created_task_id: None,
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    event_type: TaskEventType,
    value: serde_json::Value,
) -> Result<T, CoreError> {
    serde_json::from_value(value)
        .map_err(|e| CoreError::Validation(format!("Invalid {event_type:?} payload: {e}")))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Apply one event reported by the analyst at `endpoint`.
///
/// Events for a task the analyst does not hold are acknowledged without
/// effect: the task was reclaimed and may already run elsewhere.
pub async fn handle_event(
    pool: &PgPool,
    config: &SchedulerConfig,
    endpoint: &str,
    event: TaskEvent,
) -> AppResult<EventAck> {
    let task = TaskRepo::find_by_id(pool, event.task_id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Task", event.task_id)))?;
    if task.job_id != event.job_id {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Task {} does not belong to job {}",
            task.id, event.job_id
        ))));
    }
    if task.host.as_deref() != Some(endpoint) {
        tracing::debug!(
            task_id = task.id,
            endpoint,
            event = ?event.event_type,
            "Ignoring event from analyst that does not hold the task",
        );
        return Ok(EventAck::applied(false));
    }

    let event_type = event.event_type;
    let ack = match event_type {
        TaskEventType::Started => on_started(pool, &task).await?,
        TaskEventType::Progress => {
            on_progress(pool, &task, payload(event_type, event.payload)?).await?
        }
        TaskEventType::Status => on_status(pool, &task, payload(event_type, event.payload)?).await?,
        TaskEventType::Stopped => {
            on_stopped(pool, config, &task, payload(event_type, event.payload)?).await?
        }
        TaskEventType::Expand => on_expand(pool, &task, payload(event_type, event.payload)?).await?,
        TaskEventType::Error => on_error(pool, &task, payload(event_type, event.payload)?).await?,
    };

    if !ack.applied {
        tracing::debug!(task_id = task.id, event = ?event_type, "Event had no effect");
    }
    Ok(ack)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn on_started(pool: &PgPool, task: &Task) -> AppResult<EventAck> {
    let applied =
        TaskRepo::try_transition(pool, task.id, TaskState::Queued, TaskState::Running).await?;
    if applied {
        tracing::info!(task_id = task.id, job_id = task.job_id, "Task started");
    }
    Ok(EventAck::applied(applied))
}

async fn on_progress(pool: &PgPool, task: &Task, input: ProgressPayload) -> AppResult<EventAck> {
    let progress = validate_progress(input.progress)?;
    Ok(EventAck::applied(
        TaskRepo::set_progress(pool, task.id, progress).await?,
    ))
}

async fn on_status(pool: &PgPool, task: &Task, input: StatusPayload) -> AppResult<EventAck> {
    Ok(EventAck::applied(
        TaskRepo::set_status(pool, task.id, &input.status).await?,
    ))
}

async fn on_stopped(
    pool: &PgPool,
    config: &SchedulerConfig,
    task: &Task,
    input: StoppedPayload,
) -> AppResult<EventAck> {
    if let Some(state) = input.new_state {
        if !(state.is_finished() || state == TaskState::Waiting) {
            return Err(AppError::Core(CoreError::Validation(format!(
                "new_state must be Waiting, Success, Failure or Skipped, got {state}"
            ))));
        }
    }

    let from = task.state()?;
    if !from.is_dispatched() {
        return Ok(EventAck::applied(false));
    }

    let outcome = stopped_outcome(
        input.exit_status,
        task.run_count,
        config.task_retry_limit,
        input.new_state,
    );
    let failed = counts_as_failed_attempt(input.exit_status, outcome);
    if !TaskRepo::finish_attempt(pool, task.id, from, outcome, input.exit_status, failed).await? {
        return Ok(EventAck::applied(false));
    }

    tracing::info!(
        task_id = task.id,
        job_id = task.job_id,
        exit_status = input.exit_status,
        outcome = %outcome,
        "Task stopped",
    );

    if input.exit_status != 0 {
        let message = input
            .message
            .unwrap_or_else(|| format!("Task exited with status {}", input.exit_status));
        TaskErrorRepo::create(
            pool,
            &CreateTaskError {
                task_id: task.id,
                job_id: task.job_id,
                asset_id: None,
                path: None,
                message,
                processor: None,
                fatal: outcome == TaskState::Failure,
                stack: None,
            },
        )
        .await?;
    }

    release_analyst(pool, task).await?;
    if outcome.is_finished() {
        settle_finished_task(pool, task.id, task.job_id).await?;
    }
    Ok(EventAck::applied(true))
}

async fn on_expand(pool: &PgPool, task: &Task, input: ExpandPayload) -> AppResult<EventAck> {
    if input.assets.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "EXPAND requires at least one asset".into(),
        )));
    }

    let parent = TaskRepo::find_script(pool, task.id)
        .await?
        .ok_or(AppError::Core(CoreError::not_found("Task", task.id)))?;

    let key = expand_key(task.id, &input.assets)?;
    let name = input
        .name
        .unwrap_or_else(|| format!("Expand {} assets", input.assets.len()));
    let child = parent.expand_child(name.clone(), input.assets);

    let created =
        TaskRepo::create_expanded(pool, task.job_id, task.id, &name, &child, &key).await?;

    Ok(match created {
        Some(child) => {
            tracing::info!(
                task_id = child.id,
                parent_task_id = task.id,
                job_id = task.job_id,
                assets = child.script.assets.len(),
                "Expanded task created",
            );
            EventAck {
                applied: true,
                created_task_id: Some(child.id),
            }
        }
        None => EventAck::applied(false),
    })
}

async fn on_error(pool: &PgPool, task: &Task, input: ErrorPayload) -> AppResult<EventAck> {
    TaskErrorRepo::create(
        pool,
        &CreateTaskError {
            task_id: task.id,
            job_id: task.job_id,
            asset_id: input.asset_id,
            path: input.path,
            message: input.message,
            processor: input.processor,
            fatal: input.fatal,
            stack: input.stack,
        },
    )
    .await?;

    if !input.fatal {
        return Ok(EventAck::applied(true));
    }

    let from = task.state()?;
    if from.is_dispatched()
        && TaskRepo::finish_attempt(
            pool,
            task.id,
            from,
            TaskState::Failure,
            FATAL_EXIT_STATUS,
            true,
        )
        .await?
    {
        tracing::warn!(task_id = task.id, job_id = task.job_id, "Fatal error, task failed");
        release_analyst(pool, task).await?;
        settle_finished_task(pool, task.id, task.job_id).await?;
    }
    Ok(EventAck::applied(true))
}

// ---------------------------------------------------------------------------
// Shared follow-up
// ---------------------------------------------------------------------------

/// Dedupe key of an EXPAND event: SHA-256 over the parent id and assets.
fn expand_key(parent_task_id: DbId, assets: &[AssetSpec]) -> Result<String, CoreError> {
    sha256_json(&(parent_task_id, assets))
        .map_err(|e| CoreError::Internal(format!("Failed to encode expand key: {e}")))
}

async fn release_analyst(pool: &PgPool, task: &Task) -> Result<(), sqlx::Error> {
    if let Some(host) = &task.host {
        AnalystRepo::clear_task(pool, host, task.id).await?;
    }
    Ok(())
}

/// Follow-up for a task that reached a finished state: release TaskOnTask
/// dependers, re-derive the job state and, if the job finished, release
/// JobOnJob dependers.
pub async fn settle_finished_task(
    pool: &PgPool,
    task_id: DbId,
    job_id: DbId,
) -> Result<(), sqlx::Error> {
    let released = DependRepo::resolve_task(pool, task_id).await?;
    if !released.is_empty() {
        tracing::info!(task_id, released = released.len(), "Task dependencies released");
    }
    settle_job(pool, job_id).await
}

/// Re-derive a job's state and release its JobOnJob dependers when it has
/// finished.
pub async fn settle_job(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
    if let Some(state) = JobRepo::recompute_state(pool, job_id).await? {
        if state.is_finished() {
            release_job_dependers(pool, job_id).await?;
        }
    }
    Ok(())
}

/// Flip JobOnJob edges on a finished job inactive.
pub async fn release_job_dependers(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
    let released = DependRepo::resolve_job(pool, job_id).await?;
    if !released.is_empty() {
        tracing::info!(job_id, released = released.len(), "Job dependencies released");
    }
    Ok(())
}
