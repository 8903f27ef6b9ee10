//! Lease protocol properties of the task store contract.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};

use common::*;
use detection_engine::constants::status_groups::ACQUIRABLE_STATUSES;
use detection_engine::database::{InMemoryTaskStore, TaskStore};
use detection_engine::execution::{acquire_next_task_to_run, TaskDriverMetrics};
use detection_engine::models::{NewTask, TaskType};
use detection_engine::TaskStatus;

#[tokio::test]
async fn test_second_worker_loses_lease_on_same_version() {
    let store = InMemoryTaskStore::new();
    store.insert_raw(waiting_task(7, 3, Utc::now()));

    let now = Utc::now();
    let worker_one = store
        .conditional_set_running(7, 3, ACQUIRABLE_STATUSES, 1, now)
        .await
        .unwrap();
    let worker_two = store
        .conditional_set_running(7, 3, ACQUIRABLE_STATUSES, 2, now)
        .await
        .unwrap();

    assert!(worker_one);
    assert!(!worker_two);
    let task = store.find_task(7).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert_eq!(task.version, 4);
    assert_eq!(task.worker_id, Some(1));

    // Nothing else is waiting, so the losing worker moves on empty-handed
    let metrics = TaskDriverMetrics::new();
    let next = acquire_next_task_to_run(&store, 2, 50, &metrics).await.unwrap();
    assert!(next.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_have_a_single_winner() {
    let store = Arc::new(InMemoryTaskStore::new());
    store.insert_raw(waiting_task(1, 0, Utc::now()));

    let attempts: Vec<_> = (0..16)
        .map(|worker_id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .conditional_set_running(1, 0, ACQUIRABLE_STATUSES, worker_id, Utc::now())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        if attempt.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(store.find_task(1).await.unwrap().unwrap().version, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_workers_each_lease_distinct_tasks() {
    let store = Arc::new(InMemoryTaskStore::new());
    for ref_id in 0..6 {
        store
            .create_task(NewTask::new(TaskType::Detection, ref_id, "{}"))
            .await
            .unwrap();
    }
    let metrics = Arc::new(TaskDriverMetrics::new());

    let workers: Vec<_> = (0..6)
        .map(|worker_id| {
            let store = Arc::clone(&store);
            let metrics = Arc::clone(&metrics);
            tokio::spawn(async move {
                let mut leased = Vec::new();
                while let Some(task) =
                    acquire_next_task_to_run(store.as_ref(), worker_id, 50, &metrics)
                        .await
                        .unwrap()
                {
                    assert_eq!(task.worker_id, Some(worker_id));
                    leased.push(task.id);
                }
                leased
            })
        })
        .collect();

    let mut all_leased = Vec::new();
    for worker in workers {
        all_leased.extend(worker.await.unwrap());
    }
    let distinct: HashSet<_> = all_leased.iter().copied().collect();
    assert_eq!(all_leased.len(), 6);
    assert_eq!(distinct.len(), 6);
    assert_eq!(metrics.snapshot().wait_time_count, 6);
}

#[tokio::test]
async fn test_failed_task_is_acquirable_but_timeout_is_not() {
    let store = InMemoryTaskStore::new();
    let mut failed = waiting_task(1, 2, Utc::now());
    failed.status = TaskStatus::Failed;
    let mut timed_out = waiting_task(2, 2, Utc::now());
    timed_out.status = TaskStatus::Timeout;
    store.insert_raw(failed);
    store.insert_raw(timed_out);

    assert!(store
        .conditional_set_running(1, 2, ACQUIRABLE_STATUSES, 1, Utc::now())
        .await
        .unwrap());
    assert!(!store
        .conditional_set_running(2, 2, ACQUIRABLE_STATUSES, 1, Utc::now())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_terminal_update_requires_running() {
    let store = InMemoryTaskStore::new();
    store.insert_raw(running_task(3, 9));

    assert!(store
        .conditional_set_terminal(3, TaskStatus::Running, TaskStatus::Completed, Utc::now(), None)
        .await
        .unwrap());
    // A late writer, e.g. the reaper, cannot overwrite the recorded outcome
    assert!(!store
        .conditional_set_terminal(
            3,
            TaskStatus::Running,
            TaskStatus::Failed,
            Utc::now(),
            Some("late")
        )
        .await
        .unwrap());
    assert_eq!(
        store.find_task(3).await.unwrap().unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn test_purge_respects_cutoff_limit_and_running_tasks() {
    let store = InMemoryTaskStore::new();
    let old = Utc::now() - TimeDelta::days(90);
    for id in 1..=3 {
        store.insert_raw(waiting_task(id, 0, old));
    }
    let mut old_running = running_task(4, 1);
    old_running.create_time = old;
    store.insert_raw(old_running);
    store.insert_raw(waiting_task(5, 0, Utc::now()));

    let cutoff = Utc::now() - TimeDelta::days(60);
    assert_eq!(store.purge_tasks_created_before(cutoff, 2).await.unwrap(), 2);
    assert_eq!(store.purge_tasks_created_before(cutoff, 10).await.unwrap(), 1);

    let remaining: Vec<i64> = store.all_tasks().iter().map(|t| t.id).collect();
    assert_eq!(remaining, vec![4, 5]);
}
