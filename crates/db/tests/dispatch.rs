//! Integration tests for dispatch ranking, the claim protocol, dependency
//! gating and orphan detection.

use std::collections::BTreeMap;

use assetflow_core::scheduling::{ENV_JOB_ID, ENV_TASK_ID};
use assetflow_core::zps::ZpsScript;
use assetflow_db::models::analyst::AnalystPing;
use assetflow_db::models::job::{CreateJob, Job};
use assetflow_db::models::status::{AnalystState, DependState, TaskState};
use assetflow_db::models::task::{CreateTask, NewTask, Task};
use assetflow_db::repositories::{AnalystRepo, DependRepo, DispatchRepo, JobRepo, TaskRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const HOST: &str = "analyst-1:5500";

fn job_input(name: &str, priority: i32, max_running_tasks: i32) -> CreateJob {
    CreateJob {
        project_id: 1,
        name: name.to_string(),
        priority,
        paused: false,
        pause_expires_at: None,
        max_running_tasks,
        args: BTreeMap::new(),
        env: BTreeMap::from([("LANG".to_string(), "C".to_string())]),
    }
}

fn tasks(count: usize) -> Vec<NewTask> {
    (0..count)
        .map(|i| NewTask {
            name: format!("t{i}"),
            script: ZpsScript::new(format!("t{i}")),
        })
        .collect()
}

async fn launch(pool: &PgPool, input: CreateJob, count: usize, after: &[i64]) -> (Job, Vec<Task>) {
    JobRepo::create_with_tasks(pool, &input, &tasks(count), after)
        .await
        .unwrap()
}

fn ping() -> AnalystPing {
    AnalystPing {
        total_ram_mb: 16_384,
        free_ram_mb: 8_192,
        free_disk_mb: 100_000,
        load: 0.5,
        version: "1.0.0".into(),
        task_id: None,
    }
}

async fn finish(pool: &PgPool, task_id: i64) {
    let task = TaskRepo::find_by_id(pool, task_id).await.unwrap().unwrap();
    let from = task.state().unwrap();
    if from == TaskState::Waiting {
        TaskRepo::try_transition(pool, task_id, TaskState::Waiting, TaskState::Queued)
            .await
            .unwrap();
    }
    if from != TaskState::Running {
        TaskRepo::try_transition(pool, task_id, TaskState::Queued, TaskState::Running)
            .await
            .unwrap();
    }
    assert!(
        TaskRepo::finish_attempt(pool, task_id, TaskState::Running, TaskState::Success, 0, false)
            .await
            .unwrap()
    );
}

/// Queued plus Running, from the per-job counters.
async fn dispatched_count(pool: &PgPool, job_id: i64) -> i32 {
    let counts = JobRepo::task_counts(pool, job_id).await.unwrap().unwrap();
    counts.queued + counts.running
}

async fn state_of(pool: &PgPool, task_id: i64) -> TaskState {
    TaskRepo::find_by_id(pool, task_id)
        .await
        .unwrap()
        .unwrap()
        .state()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_candidates_ordered_by_priority_then_age(pool: PgPool) {
    let (_, standard) = launch(&pool, job_input("standard", 100, 1024), 2, &[]).await;
    let (_, interactive) = launch(&pool, job_input("interactive", 1, 1024), 1, &[]).await;

    let ranked = DispatchRepo::waiting_candidates(&pool, 10).await.unwrap();
    let ids: Vec<i64> = ranked.iter().map(|c| c.task_id).collect();
    assert_eq!(ids, vec![interactive[0].id, standard[0].id, standard[1].id]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_paused_job_is_not_a_candidate(pool: PgPool) {
    let mut input = job_input("paused", 100, 1024);
    input.paused = true;
    launch(&pool, input, 2, &[]).await;

    assert!(DispatchRepo::waiting_candidates(&pool, 10).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_expired_pause_is_a_candidate(pool: PgPool) {
    let mut input = job_input("expired", 100, 1024);
    input.paused = true;
    input.pause_expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(5));
    launch(&pool, input, 1, &[]).await;

    assert_eq!(DispatchRepo::waiting_candidates(&pool, 10).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_claim_queues_task_and_points_analyst_at_it(pool: PgPool) {
    AnalystRepo::upsert_ping(&pool, HOST, &ping()).await.unwrap();
    let (job, created) = launch(&pool, job_input("claim", 100, 1024), 1, &[]).await;

    let candidate = DispatchRepo::waiting_candidates(&pool, 1).await.unwrap()[0];
    let dispatched = DispatchRepo::claim(&pool, candidate, HOST)
        .await
        .unwrap()
        .expect("claim succeeds");

    assert_eq!(dispatched.id, created[0].id);
    assert_eq!(dispatched.state, TaskState::Queued);
    assert_eq!(dispatched.host, HOST);
    assert_eq!(dispatched.env.get(ENV_TASK_ID), Some(&created[0].id.to_string()));
    assert_eq!(dispatched.env.get(ENV_JOB_ID), Some(&job.id.to_string()));
    assert_eq!(dispatched.env.get("LANG").map(String::as_str), Some("C"));
    assert_eq!(dispatched.log_name, format!("{}-0", created[0].id));

    let analyst = AnalystRepo::find_by_endpoint(&pool, HOST).await.unwrap().unwrap();
    assert_eq!(analyst.task_id, Some(created[0].id));
    assert_eq!(dispatched_count(&pool, job.id).await, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_same_candidate_cannot_be_claimed_twice(pool: PgPool) {
    launch(&pool, job_input("race", 100, 1024), 1, &[]).await;
    let candidate = DispatchRepo::waiting_candidates(&pool, 1).await.unwrap()[0];

    let first = DispatchRepo::claim(&pool, candidate, "a:1").await.unwrap();
    let second = DispatchRepo::claim(&pool, candidate, "b:1").await.unwrap();

    assert!(first.is_some());
    assert!(second.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_claim_respects_max_running_tasks(pool: PgPool) {
    let (job, _) = launch(&pool, job_input("capped", 100, 1), 2, &[]).await;

    // Both tasks ranked before either is claimed.
    let ranked = DispatchRepo::waiting_candidates(&pool, 10).await.unwrap();
    assert_eq!(ranked.len(), 2);

    assert!(DispatchRepo::claim(&pool, ranked[0], "a:1").await.unwrap().is_some());
    assert!(DispatchRepo::claim(&pool, ranked[1], "b:1").await.unwrap().is_none());
    assert_eq!(dispatched_count(&pool, job.id).await, 1);

    // The capped job drops out of the ranking entirely.
    assert!(DispatchRepo::waiting_candidates(&pool, 10).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Depend gating
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_job_on_job_depend_holds_then_releases(pool: PgPool) {
    let (upstream, up_tasks) = launch(&pool, job_input("upstream", 100, 1024), 1, &[]).await;
    let (downstream, down_tasks) =
        launch(&pool, job_input("downstream", 100, 1024), 2, &[upstream.id]).await;

    for t in &down_tasks {
        assert_eq!(t.state().unwrap(), TaskState::Depend);
    }
    let ranked = DispatchRepo::waiting_candidates(&pool, 10).await.unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].task_id, up_tasks[0].id);

    finish(&pool, up_tasks[0].id).await;
    let released = DependRepo::resolve_job(&pool, upstream.id).await.unwrap();
    assert_eq!(released.len(), 2);

    for t in &down_tasks {
        assert_eq!(state_of(&pool, t.id).await, TaskState::Waiting);
    }
    let edges = DependRepo::list_for_job(&pool, downstream.id).await.unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].state_id, DependState::Inactive.id());
    assert!(edges[0].resolved_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_depend_on_finished_job_creates_no_edge(pool: PgPool) {
    let (upstream, up_tasks) = launch(&pool, job_input("done", 100, 1024), 1, &[]).await;
    finish(&pool, up_tasks[0].id).await;
    JobRepo::recompute_state(&pool, upstream.id).await.unwrap();

    let (downstream, down_tasks) =
        launch(&pool, job_input("after-done", 100, 1024), 1, &[upstream.id]).await;
    assert_eq!(down_tasks[0].state().unwrap(), TaskState::Waiting);
    assert!(DependRepo::list_for_job(&pool, downstream.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_task_on_task_depend_releases_only_when_all_resolved(pool: PgPool) {
    let (job, existing) = launch(&pool, job_input("tot", 100, 1024), 2, &[]).await;

    let input = CreateTask {
        name: "merge".into(),
        script: ZpsScript::new("merge"),
        depend_on_task_ids: vec![existing[0].id, existing[1].id],
    };
    let merge = TaskRepo::create(&pool, job.id, job.project_id, &input).await.unwrap();
    assert_eq!(merge.state().unwrap(), TaskState::Depend);

    finish(&pool, existing[0].id).await;
    assert!(DependRepo::resolve_task(&pool, existing[0].id).await.unwrap().is_empty());
    assert_eq!(state_of(&pool, merge.id).await, TaskState::Depend);

    finish(&pool, existing[1].id).await;
    let released = DependRepo::resolve_task(&pool, existing[1].id).await.unwrap();
    assert_eq!(released, vec![merge.id]);
    assert_eq!(state_of(&pool, merge.id).await, TaskState::Waiting);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_task_added_to_gated_job_starts_in_depend(pool: PgPool) {
    let (upstream, _) = launch(&pool, job_input("gate", 100, 1024), 1, &[]).await;
    let (downstream, _) = launch(&pool, job_input("gated", 100, 1024), 0, &[upstream.id]).await;

    let input = CreateTask {
        name: "late".into(),
        script: ZpsScript::new("late"),
        depend_on_task_ids: Vec::new(),
    };
    let task = TaskRepo::create(&pool, downstream.id, downstream.project_id, &input)
        .await
        .unwrap();
    assert_eq!(task.state().unwrap(), TaskState::Depend);
}

// ---------------------------------------------------------------------------
// Orphans
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_task_on_down_analyst_is_orphaned(pool: PgPool) {
    AnalystRepo::upsert_ping(&pool, HOST, &ping()).await.unwrap();
    launch(&pool, job_input("orphan", 100, 1024), 1, &[]).await;
    let candidate = DispatchRepo::waiting_candidates(&pool, 1).await.unwrap()[0];
    DispatchRepo::claim(&pool, candidate, HOST).await.unwrap().unwrap();

    let long_ago = chrono::Utc::now() - chrono::Duration::seconds(3600);
    assert!(TaskRepo::find_orphaned(&pool, long_ago).await.unwrap().is_empty());

    let cutoff = chrono::Utc::now() + chrono::Duration::seconds(1);
    let down = AnalystRepo::mark_stale_down(&pool, cutoff).await.unwrap();
    assert_eq!(down, vec![HOST.to_string()]);

    let analyst = AnalystRepo::find_by_endpoint(&pool, HOST).await.unwrap().unwrap();
    assert_eq!(analyst.state_id, AnalystState::Down.id());
    assert_eq!(analyst.task_id, None);

    let orphans = TaskRepo::find_orphaned(&pool, long_ago).await.unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, candidate.task_id);

    assert!(
        TaskRepo::reclaim(&pool, candidate.task_id, TaskState::Queued, TaskState::Waiting)
            .await
            .unwrap()
    );
    let task = TaskRepo::find_by_id(&pool, candidate.task_id).await.unwrap().unwrap();
    assert_eq!(task.run_count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_stale_task_not_reported_by_live_analyst_is_orphaned(pool: PgPool) {
    AnalystRepo::upsert_ping(&pool, HOST, &ping()).await.unwrap();
    launch(&pool, job_input("silent", 100, 1024), 1, &[]).await;
    let candidate = DispatchRepo::waiting_candidates(&pool, 1).await.unwrap()[0];
    DispatchRepo::claim(&pool, candidate, HOST).await.unwrap().unwrap();

    let future = chrono::Utc::now() + chrono::Duration::seconds(60);
    // Still the analyst's current task: never orphaned while the analyst is up.
    assert!(TaskRepo::find_orphaned(&pool, future).await.unwrap().is_empty());

    AnalystRepo::clear_task(&pool, HOST, candidate.task_id).await.unwrap();
    let orphans = TaskRepo::find_orphaned(&pool, future).await.unwrap();
    assert_eq!(orphans.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_ping_keeps_task_when_not_reported(pool: PgPool) {
    let (_, created) = launch(&pool, job_input("keep", 100, 1024), 1, &[]).await;
    let mut with_task = ping();
    with_task.task_id = Some(created[0].id);
    AnalystRepo::upsert_ping(&pool, HOST, &with_task).await.unwrap();

    let analyst = AnalystRepo::upsert_ping(&pool, HOST, &ping()).await.unwrap();
    assert_eq!(analyst.task_id, Some(created[0].id));
    assert_eq!(analyst.state_id, AnalystState::Up.id());

    assert!(AnalystRepo::clear_task(&pool, HOST, created[0].id).await.unwrap());
    let analyst = AnalystRepo::find_by_endpoint(&pool, HOST).await.unwrap().unwrap();
    assert_eq!(analyst.task_id, None);
}
