//! Task execution outcomes, heartbeats, crash recovery and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::*;
use detection_engine::config::TaskDriverConfig;
use detection_engine::constants::status_groups::ACQUIRABLE_STATUSES;
use detection_engine::constants::LEFTOVER_TASK_MESSAGE;
use detection_engine::database::TaskStore;
use detection_engine::execution::{
    TaskDriver, TaskDriverMetrics, TaskExecutor, TaskOutcome, WorkerIdentity, WorkerPoolManager,
};
use detection_engine::models::{NewTask, Task, TaskType};
use detection_engine::registry::{TaskRunner, TaskRunnerRegistry};
use detection_engine::TaskStatus;

const MONITOR_PAYLOAD: &str = r#"{"monitorType":"UPDATE"}"#;

fn runners_with(runner: Arc<dyn TaskRunner>) -> TaskRunnerRegistry {
    let runners = TaskRunnerRegistry::new();
    runners.register(TaskType::Monitor, runner);
    runners
}

fn build_executor(
    store: &Arc<RecordingStore>,
    runners: TaskRunnerRegistry,
    identity: WorkerIdentity,
    config: TaskDriverConfig,
) -> (TaskExecutor, Arc<TaskDriverMetrics>) {
    let pool = Arc::new(WorkerPoolManager::new(config.max_parallel_tasks));
    build_executor_on(store, runners, identity, config, pool)
}

fn build_executor_on(
    store: &Arc<RecordingStore>,
    runners: TaskRunnerRegistry,
    identity: WorkerIdentity,
    config: TaskDriverConfig,
    pool: Arc<WorkerPoolManager>,
) -> (TaskExecutor, Arc<TaskDriverMetrics>) {
    let metrics = Arc::new(TaskDriverMetrics::new());
    let executor = TaskExecutor::new(
        Arc::clone(store) as Arc<dyn TaskStore>,
        runners,
        pool,
        identity,
        config,
        Arc::clone(&metrics),
    );
    (executor, metrics)
}

/// Create a MONITOR task and lease it for `worker_id`
async fn leased_task(store: &RecordingStore, payload: &str, worker_id: i64) -> Task {
    let task = store
        .create_task(NewTask::new(TaskType::Monitor, 1, payload))
        .await
        .unwrap();
    assert!(store
        .conditional_set_running(task.id, task.version, ACQUIRABLE_STATUSES, worker_id, Utc::now())
        .await
        .unwrap());
    store.find_task(task.id).await.unwrap().unwrap()
}

async fn wait_for_status(store: &RecordingStore, task_id: i64, status: TaskStatus) {
    for _ in 0..1_000 {
        if store.task(task_id).status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("task {task_id} never reached {status}");
}

#[tokio::test(start_paused = true)]
async fn test_fast_runner_completes() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Sleep(Duration::from_secs(2)));
    let identity = WorkerIdentity::fixed(1).unwrap();
    let (executor, metrics) = build_executor(&store, runners_with(runner), identity, fast_driver_config(1));

    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;
    let outcome = executor.execute(&task).await;

    assert!(matches!(outcome, TaskOutcome::Completed(_)));
    let stored = store.task(task.id);
    assert_eq!(stored.status, TaskStatus::Completed);
    assert!(stored.end_time.is_some());
    assert_eq!(stored.message, None);
    assert_eq!(metrics.snapshot().tasks_succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_runner_times_out() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Sleep(Duration::from_secs(60)));
    let identity = WorkerIdentity::fixed(1).unwrap();
    let (executor, metrics) = build_executor(&store, runners_with(runner), identity, fast_driver_config(1));

    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;
    let started = tokio::time::Instant::now();
    let outcome = executor.execute(&task).await;

    assert_eq!(outcome, TaskOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(60));
    let stored = store.task(task.id);
    assert_eq!(stored.status, TaskStatus::Timeout);
    assert!(stored.message.unwrap().contains("10000 ms"));
    assert_eq!(metrics.snapshot().tasks_timed_out, 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_covers_waiting_for_an_execution_slot() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Succeed);
    let pool = Arc::new(WorkerPoolManager::new(1));
    // A runner that ignored its abort still holds the only permit
    let _stuck = pool.submit(std::future::pending::<()>()).await.unwrap();
    let (executor, metrics) = build_executor_on(
        &store,
        runners_with(runner.clone()),
        WorkerIdentity::fixed(1).unwrap(),
        fast_driver_config(1),
        Arc::clone(&pool),
    );

    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;
    let started = tokio::time::Instant::now();
    let outcome = executor.execute(&task).await;

    assert_eq!(outcome, TaskOutcome::TimedOut);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10));
    assert!(elapsed < Duration::from_secs(11));
    assert_eq!(runner.calls(), 0);
    assert_eq!(store.task(task.id).status, TaskStatus::Timeout);
    assert_eq!(metrics.snapshot().tasks_timed_out, 1);
}

#[tokio::test(start_paused = true)]
async fn test_task_leased_before_shutdown_still_runs() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Sleep(Duration::from_secs(1)));
    let pool = Arc::new(WorkerPoolManager::new(1));
    let (executor, _) = build_executor_on(
        &store,
        runners_with(runner.clone()),
        WorkerIdentity::fixed(1).unwrap(),
        fast_driver_config(1),
        Arc::clone(&pool),
    );
    let executor = Arc::new(executor);
    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;

    let (go_tx, go_rx) = tokio::sync::oneshot::channel::<()>();
    let loop_executor = Arc::clone(&executor);
    let loop_task = task.clone();
    pool.spawn_watcher(async move {
        let _ = go_rx.await;
        loop_executor.execute(&loop_task).await;
    })
    .await
    .unwrap();

    let shutdown_pool = Arc::clone(&pool);
    let shutdown = tokio::spawn(async move { shutdown_pool.shutdown().await });
    while !pool.is_shutdown() {
        tokio::task::yield_now().await;
    }
    go_tx.send(()).unwrap();
    shutdown.await.unwrap();

    assert_eq!(runner.calls(), 1);
    assert_eq!(store.task(task.id).status, TaskStatus::Completed);
}

#[tokio::test]
async fn test_lease_released_when_pool_already_drained() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Succeed);
    let pool = Arc::new(WorkerPoolManager::new(1));
    let (executor, _) = build_executor_on(
        &store,
        runners_with(runner.clone()),
        WorkerIdentity::fixed(1).unwrap(),
        fast_driver_config(1),
        Arc::clone(&pool),
    );

    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;
    pool.shutdown().await;
    let outcome = executor.execute(&task).await;

    assert_eq!(outcome, TaskOutcome::Released);
    assert_eq!(runner.calls(), 0);
    let stored = store.task(task.id);
    assert_eq!(stored.status, TaskStatus::Waiting);
    assert_eq!(stored.worker_id, None);
    assert_eq!(stored.message, None);
    let waiting = store.find_waiting_ordered_by_create_time(10, true).await.unwrap();
    assert_eq!(waiting.len(), 1);
}

#[tokio::test]
async fn test_runner_error_fails_task_with_message() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Fail("upstream data missing".into()));
    let identity = WorkerIdentity::fixed(1).unwrap();
    let (executor, _) = build_executor(&store, runners_with(runner), identity, fast_driver_config(1));

    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;
    let outcome = executor.execute(&task).await;

    assert!(matches!(outcome, TaskOutcome::Failed(ref m) if m.contains("upstream data missing")));
    let stored = store.task(task.id);
    assert_eq!(stored.status, TaskStatus::Failed);
    assert!(stored.message.unwrap().contains("upstream data missing"));
}

#[tokio::test]
async fn test_undecodable_payload_fails_without_running() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Succeed);
    let identity = WorkerIdentity::fixed(1).unwrap();
    let (executor, _) = build_executor(
        &store,
        runners_with(runner.clone()),
        identity,
        fast_driver_config(1),
    );

    let task = leased_task(&store, "not json", 1).await;
    let outcome = executor.execute(&task).await;

    assert!(matches!(outcome, TaskOutcome::Failed(_)));
    assert_eq!(runner.calls(), 0);
    assert_eq!(store.task(task.id).status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_missing_runner_fails_task() {
    let store = RecordingStore::new();
    let identity = WorkerIdentity::fixed(1).unwrap();
    let (executor, _) = build_executor(
        &store,
        TaskRunnerRegistry::new(),
        identity,
        fast_driver_config(1),
    );

    let task = leased_task(&store, MONITOR_PAYLOAD, 1).await;
    let outcome = executor.execute(&task).await;

    assert!(matches!(outcome, TaskOutcome::Failed(ref m) if m.contains("MONITOR")));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_runs_only_for_random_identity() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Sleep(Duration::from_secs(7)));
    let identity = WorkerIdentity::random();
    let (executor, _) = build_executor(
        &store,
        runners_with(runner.clone()),
        identity,
        fast_driver_config(1),
    );

    let task = leased_task(&store, MONITOR_PAYLOAD, identity.id()).await;
    executor.execute(&task).await;

    // Ticks at 0s, 2s, 4s and 6s of a 7s run
    let touches = store.touch_count();
    assert!(touches >= 3, "expected heartbeats, got {touches}");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(store.touch_count(), touches, "heartbeat outlived its task");

    let fixed_store = RecordingStore::new();
    let (fixed_executor, _) = build_executor(
        &fixed_store,
        runners_with(runner),
        WorkerIdentity::fixed(4).unwrap(),
        fast_driver_config(1),
    );
    let task = leased_task(&fixed_store, MONITOR_PAYLOAD, 4).await;
    fixed_executor.execute(&task).await;
    assert_eq!(fixed_store.touch_count(), 0);
}

#[tokio::test]
async fn test_recovery_only_fails_own_running_tasks() {
    let store = RecordingStore::new();
    store.inner.insert_raw(running_task(1, 42));
    store.inner.insert_raw(running_task(2, 43));

    let driver = TaskDriver::with_identity(
        WorkerIdentity::fixed(42).unwrap(),
        fast_driver_config(1),
        Arc::clone(&store) as Arc<dyn TaskStore>,
        TaskRunnerRegistry::new(),
    );
    assert_eq!(driver.recover_leftover_tasks().await.unwrap(), 1);

    let own = store.task(1);
    assert_eq!(own.status, TaskStatus::Failed);
    assert_eq!(own.message.as_deref(), Some(LEFTOVER_TASK_MESSAGE));
    assert_eq!(store.task(2).status, TaskStatus::Running);
    assert_eq!(driver.metrics().leftover_tasks_recovered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_driver_runs_waiting_tasks_to_completion() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Succeed);
    let mut ids = Vec::new();
    for ref_id in 0..3 {
        let task = store
            .create_task(NewTask::new(TaskType::Monitor, ref_id, MONITOR_PAYLOAD))
            .await
            .unwrap();
        ids.push(task.id);
    }

    let driver = TaskDriver::with_identity(
        WorkerIdentity::fixed(1).unwrap(),
        fast_driver_config(2),
        Arc::clone(&store) as Arc<dyn TaskStore>,
        runners_with(runner.clone()),
    );
    driver.start().await.unwrap();
    for id in &ids {
        wait_for_status(&store, *id, TaskStatus::Completed).await;
    }
    driver.shutdown().await;

    assert!(driver.is_shutdown());
    assert_eq!(runner.calls(), 3);
    let metrics = driver.metrics();
    assert_eq!(metrics.tasks_started, 3);
    assert_eq!(metrics.tasks_succeeded, 3);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_lets_in_flight_task_finish() {
    let store = RecordingStore::new();
    let runner = ScriptedRunner::new(RunnerBehavior::Sleep(Duration::from_secs(5)));
    let task = store
        .create_task(NewTask::new(TaskType::Monitor, 1, MONITOR_PAYLOAD))
        .await
        .unwrap();

    let driver = TaskDriver::with_identity(
        WorkerIdentity::fixed(1).unwrap(),
        fast_driver_config(1),
        Arc::clone(&store) as Arc<dyn TaskStore>,
        runners_with(runner),
    );
    driver.start().await.unwrap();
    wait_for_status(&store, task.id, TaskStatus::Running).await;

    driver.shutdown().await;
    assert_eq!(store.task(task.id).status, TaskStatus::Completed);
}
