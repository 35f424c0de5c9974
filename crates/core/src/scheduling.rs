//! Job/Task scheduling constants, state machines and derived job state.
//!
//! This module lives in `core` (zero internal deps) so it can be used by the
//! repository layer, the dispatch engine and the background sweeps alike.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::{JobState, TaskState};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority for interactive jobs. Dispatched before all others.
pub const PRIORITY_INTERACTIVE: i32 = 1;

/// Priority for normal jobs. Default.
pub const PRIORITY_STANDARD: i32 = 100;

/// Priority for bulk reindex jobs. Dispatched last.
pub const PRIORITY_REINDEX: i32 = 1000;

/// Default concurrency cap for a single job.
pub const DEFAULT_MAX_RUNNING_TASKS: i32 = 1024;

/// Default number of failed attempts before a task is marked `Failure`.
pub const DEFAULT_RETRY_LIMIT: i32 = 3;

/// Number of candidates the dispatcher ranks per round trip.
pub const DEFAULT_DISPATCH_POLL_COUNT: i64 = 5;

const MAX_JOB_NAME_LEN: usize = 255;

// ---------------------------------------------------------------------------
// Dispatch environment
// ---------------------------------------------------------------------------

/// Environment variable carrying the task id to the analyst.
pub const ENV_TASK_ID: &str = "ASSETFLOW_TASK_ID";
/// Environment variable carrying the job id to the analyst.
pub const ENV_JOB_ID: &str = "ASSETFLOW_JOB_ID";
/// Environment variable carrying the project id to the analyst.
pub const ENV_PROJECT_ID: &str = "ASSETFLOW_PROJECT_ID";
/// Environment variable carrying the attempt number to the analyst.
pub const ENV_RUN_COUNT: &str = "ASSETFLOW_RUN_COUNT";

/// Merge the job environment with the ids injected for every dispatch.
///
/// Injected keys win over job-supplied ones so an analyst can always trust
/// them.
pub fn dispatch_env(
    job_env: &BTreeMap<String, String>,
    task_id: DbId,
    job_id: DbId,
    project_id: DbId,
    run_count: i32,
) -> BTreeMap<String, String> {
    let mut env = job_env.clone();
    env.insert(ENV_TASK_ID.to_string(), task_id.to_string());
    env.insert(ENV_JOB_ID.to_string(), job_id.to_string());
    env.insert(ENV_PROJECT_ID.to_string(), project_id.to_string());
    env.insert(ENV_RUN_COUNT.to_string(), run_count.to_string());
    env
}

/// Log file name for one attempt of a task.
pub fn log_name(task_id: DbId, run_count: i32) -> String {
    format!("{task_id}-{run_count}")
}

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

pub mod task_state_machine {
    use super::*;

    /// Returns the set of states reachable from `from`.
    pub fn valid_transitions(from: TaskState) -> &'static [TaskState] {
        use TaskState::*;
        match from {
            Waiting => &[Queued, Skipped, Depend],
            Depend => &[Waiting, Skipped],
            // Stop before start and reclaim both leave from Queued.
            Queued => &[Running, Waiting, Success, Failure, Skipped],
            Running => &[Success, Failure, Skipped, Waiting],
            // Operator retry.
            Failure => &[Waiting],
            Success | Skipped => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: TaskState, to: TaskState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning a validation error for invalid ones.
    pub fn validate_transition(from: TaskState, to: TaskState) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Invalid task transition: {from} ({}) -> {to} ({})",
                from.id(),
                to.id()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Job state machine
// ---------------------------------------------------------------------------

pub mod job_state_machine {
    use super::*;

    /// Returns the set of states reachable from `from`.
    pub fn valid_transitions(from: JobState) -> &'static [JobState] {
        use JobState::*;
        match from {
            InProgress => &[Cancelled, Success, Failure],
            // Task retries revive a finished job.
            Success | Failure => &[InProgress, Archived],
            Cancelled => &[InProgress, Archived],
            Archived => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning a validation error for invalid ones.
    pub fn validate_transition(from: JobState, to: JobState) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Invalid job transition: {from} ({}) -> {to} ({})",
                from.id(),
                to.id()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Derived job state
// ---------------------------------------------------------------------------

/// Per-state task counts for one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStateCounts {
    pub total: i32,
    pub waiting: i32,
    pub running: i32,
    pub success: i32,
    pub failure: i32,
    pub skipped: i32,
    pub queued: i32,
    pub depend: i32,
}

impl TaskStateCounts {
    /// Tasks that still have work ahead of them.
    pub fn unfinished(&self) -> i32 {
        self.waiting + self.running + self.queued + self.depend
    }

    /// Tasks counting against `max_running_tasks`.
    pub fn active(&self) -> i32 {
        self.running + self.queued
    }

    /// Count tasks in a single state.
    pub fn get(&self, state: TaskState) -> i32 {
        match state {
            TaskState::Waiting => self.waiting,
            TaskState::Running => self.running,
            TaskState::Success => self.success,
            TaskState::Failure => self.failure,
            TaskState::Skipped => self.skipped,
            TaskState::Queued => self.queued,
            TaskState::Depend => self.depend,
        }
    }
}

/// Derive a job's state from its task counts.
///
/// `Cancelled` and `Archived` are overrides and are returned unchanged.
/// A job with no tasks stays `InProgress`.
pub fn derive_job_state(current: JobState, counts: &TaskStateCounts) -> JobState {
    if matches!(current, JobState::Cancelled | JobState::Archived) {
        return current;
    }
    if counts.total == 0 || counts.unfinished() > 0 {
        JobState::InProgress
    } else if counts.failure > 0 {
        JobState::Failure
    } else {
        JobState::Success
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Decide the state a task moves to when its analyst reports STOPPED.
///
/// `run_count` is the number of failed attempts recorded before this stop.
/// An explicit `new_state` from the analyst wins over the exit code.
pub fn stopped_outcome(
    exit_status: i32,
    run_count: i32,
    retry_limit: i32,
    new_state: Option<TaskState>,
) -> TaskState {
    if let Some(state) = new_state {
        return state;
    }
    if exit_status == 0 {
        TaskState::Success
    } else {
        retry_or_fail(run_count, retry_limit)
    }
}

/// Requeue a failed or reclaimed attempt unless retries are exhausted.
pub fn retry_or_fail(run_count: i32, retry_limit: i32) -> TaskState {
    if run_count < retry_limit {
        TaskState::Waiting
    } else {
        TaskState::Failure
    }
}

/// Whether an attempt ending in `outcome` counts as a failed attempt.
pub fn counts_as_failed_attempt(exit_status: i32, outcome: TaskState) -> bool {
    exit_status != 0 && matches!(outcome, TaskState::Waiting | TaskState::Failure)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a job name.
pub fn validate_job_name(name: &str) -> Result<(), CoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Job name must not be empty".into()));
    }
    if trimmed.len() > MAX_JOB_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "Job name exceeds {MAX_JOB_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate the concurrency cap of a job.
pub fn validate_max_running_tasks(value: i32) -> Result<(), CoreError> {
    if value < 1 {
        return Err(CoreError::Validation(format!(
            "max_running_tasks must be at least 1, got {value}"
        )));
    }
    Ok(())
}

/// Validate a task progress value (percent).
pub fn validate_progress(value: i32) -> Result<i16, CoreError> {
    if !(0..=100).contains(&value) {
        return Err(CoreError::Validation(format!(
            "progress must be between 0 and 100, got {value}"
        )));
    }
    Ok(value as i16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(waiting: i32, running: i32, success: i32, failure: i32) -> TaskStateCounts {
        TaskStateCounts {
            total: waiting + running + success + failure,
            waiting,
            running,
            success,
            failure,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Task transitions
    // -----------------------------------------------------------------------

    #[test]
    fn waiting_to_queued() {
        assert!(task_state_machine::can_transition(TaskState::Waiting, TaskState::Queued));
    }

    #[test]
    fn waiting_cannot_jump_to_running() {
        assert!(!task_state_machine::can_transition(TaskState::Waiting, TaskState::Running));
    }

    #[test]
    fn depend_releases_to_waiting() {
        assert!(task_state_machine::can_transition(TaskState::Depend, TaskState::Waiting));
        assert!(!task_state_machine::can_transition(TaskState::Depend, TaskState::Queued));
    }

    #[test]
    fn running_can_be_requeued() {
        assert!(task_state_machine::can_transition(TaskState::Running, TaskState::Waiting));
    }

    #[test]
    fn success_and_skipped_are_terminal() {
        assert!(task_state_machine::valid_transitions(TaskState::Success).is_empty());
        assert!(task_state_machine::valid_transitions(TaskState::Skipped).is_empty());
    }

    #[test]
    fn failure_can_only_be_retried() {
        assert_eq!(
            task_state_machine::valid_transitions(TaskState::Failure),
            &[TaskState::Waiting]
        );
    }

    #[test]
    fn validate_transition_names_both_states() {
        let err = task_state_machine::validate_transition(TaskState::Success, TaskState::Running)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Success"));
        assert!(msg.contains("Running"));
    }

    // -----------------------------------------------------------------------
    // Job transitions
    // -----------------------------------------------------------------------

    #[test]
    fn archived_is_terminal() {
        assert!(job_state_machine::valid_transitions(JobState::Archived).is_empty());
    }

    #[test]
    fn in_progress_cannot_be_archived() {
        assert!(!job_state_machine::can_transition(JobState::InProgress, JobState::Archived));
    }

    #[test]
    fn cancelled_can_restart() {
        assert!(job_state_machine::can_transition(JobState::Cancelled, JobState::InProgress));
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    #[test]
    fn empty_job_stays_in_progress() {
        let state = derive_job_state(JobState::InProgress, &TaskStateCounts::default());
        assert_eq!(state, JobState::InProgress);
    }

    #[test]
    fn any_unfinished_task_keeps_job_in_progress() {
        assert_eq!(
            derive_job_state(JobState::InProgress, &counts(1, 0, 3, 1)),
            JobState::InProgress
        );
        let depend_only = TaskStateCounts {
            total: 2,
            success: 1,
            depend: 1,
            ..Default::default()
        };
        assert_eq!(
            derive_job_state(JobState::InProgress, &depend_only),
            JobState::InProgress
        );
    }

    #[test]
    fn all_terminal_with_failure_is_failure() {
        assert_eq!(
            derive_job_state(JobState::InProgress, &counts(0, 0, 3, 1)),
            JobState::Failure
        );
    }

    #[test]
    fn all_success_or_skipped_is_success() {
        let c = TaskStateCounts {
            total: 3,
            success: 2,
            skipped: 1,
            ..Default::default()
        };
        assert_eq!(derive_job_state(JobState::InProgress, &c), JobState::Success);
    }

    #[test]
    fn retry_revives_finished_job() {
        assert_eq!(
            derive_job_state(JobState::Failure, &counts(1, 0, 3, 0)),
            JobState::InProgress
        );
    }

    #[test]
    fn overrides_are_never_recomputed() {
        let c = counts(0, 0, 4, 0);
        assert_eq!(derive_job_state(JobState::Cancelled, &c), JobState::Cancelled);
        assert_eq!(derive_job_state(JobState::Archived, &c), JobState::Archived);
    }

    #[test]
    fn recomputation_is_idempotent() {
        let c = counts(0, 0, 2, 1);
        let once = derive_job_state(JobState::InProgress, &c);
        assert_eq!(derive_job_state(once, &c), once);
    }

    // -----------------------------------------------------------------------
    // Retry policy
    // -----------------------------------------------------------------------

    #[test]
    fn exit_zero_is_success() {
        assert_eq!(stopped_outcome(0, 0, 3, None), TaskState::Success);
    }

    #[test]
    fn failure_below_ceiling_requeues() {
        assert_eq!(stopped_outcome(1, 2, 3, None), TaskState::Waiting);
    }

    #[test]
    fn failure_at_ceiling_fails() {
        assert_eq!(stopped_outcome(1, 3, 3, None), TaskState::Failure);
    }

    #[test]
    fn zero_retry_limit_fails_immediately() {
        assert_eq!(stopped_outcome(2, 0, 0, None), TaskState::Failure);
    }

    #[test]
    fn explicit_new_state_wins() {
        assert_eq!(
            stopped_outcome(1, 0, 3, Some(TaskState::Skipped)),
            TaskState::Skipped
        );
    }

    #[test]
    fn failed_attempt_accounting() {
        assert!(counts_as_failed_attempt(1, TaskState::Waiting));
        assert!(!counts_as_failed_attempt(0, TaskState::Success));
        assert!(!counts_as_failed_attempt(1, TaskState::Skipped));
    }

    // -----------------------------------------------------------------------
    // Dispatch env and validation
    // -----------------------------------------------------------------------

    #[test]
    fn injected_env_overrides_job_env() {
        let mut job_env = BTreeMap::new();
        job_env.insert(ENV_TASK_ID.to_string(), "spoofed".to_string());
        job_env.insert("CUSTOM".to_string(), "1".to_string());

        let env = dispatch_env(&job_env, 7, 3, 1, 2);
        assert_eq!(env[ENV_TASK_ID], "7");
        assert_eq!(env[ENV_JOB_ID], "3");
        assert_eq!(env[ENV_PROJECT_ID], "1");
        assert_eq!(env[ENV_RUN_COUNT], "2");
        assert_eq!(env["CUSTOM"], "1");
    }

    #[test]
    fn log_name_includes_attempt() {
        assert_eq!(log_name(12, 0), "12-0");
    }

    #[test]
    fn priorities_order_reindex_last() {
        assert!(PRIORITY_INTERACTIVE < PRIORITY_STANDARD);
        assert!(PRIORITY_STANDARD < PRIORITY_REINDEX);
    }

    #[test]
    fn job_name_validation() {
        assert!(validate_job_name("import batch").is_ok());
        assert!(validate_job_name("   ").is_err());
        assert!(validate_job_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn max_running_tasks_must_be_positive() {
        assert!(validate_max_running_tasks(1).is_ok());
        assert!(validate_max_running_tasks(0).is_err());
    }

    #[test]
    fn progress_bounds() {
        assert_eq!(validate_progress(55).unwrap(), 55);
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(-1).is_err());
    }
}
