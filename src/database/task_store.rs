//! # Task Store Contract
//!
//! The persisted task queue as seen by workers. Every state-changing
//! operation is a single conditional write; exclusive ownership of a task is
//! decided by the store, never by in-process locking.
//!
//! ## Primitives
//!
//! - [`TaskStore::conditional_set_running`] is the lease. It succeeds for at
//!   most one caller per `(task_id, version)`.
//! - [`TaskStore::conditional_set_terminal`] records an outcome, gated on the
//!   task still being RUNNING.
//! - [`TaskStore::release_lease`] hands an unexecuted task back to WAITING.
//! - [`TaskStore::touch_last_active`] is the heartbeat.
//! - [`TaskStore::find_running_owned_by`] feeds crash recovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{NewTask, Task};
use crate::state_machine::TaskStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Task {task_id} has a corrupt record: {reason}")]
    CorruptRecord { task_id: i64, reason: String },

    #[error("Task store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    pub fn database(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Database { operation, source }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new WAITING task with version 0
    async fn create_task(&self, new_task: NewTask) -> StoreResult<Task>;

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<Task>>;

    /// Up to `limit` WAITING tasks ordered by creation time
    async fn find_waiting_ordered_by_create_time(
        &self,
        limit: i64,
        ascending: bool,
    ) -> StoreResult<Vec<Task>>;

    /// Lease a task: set RUNNING, owner, start time and bump the version,
    /// only if the stored version equals `expected_version` and the status is
    /// one of `allowed_statuses`. Returns whether this caller won.
    async fn conditional_set_running(
        &self,
        task_id: i64,
        expected_version: i64,
        allowed_statuses: &[TaskStatus],
        worker_id: i64,
        start_time: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Record an outcome only if the task is currently in `expected_status`
    async fn conditional_set_terminal(
        &self,
        task_id: i64,
        expected_status: TaskStatus,
        new_status: TaskStatus,
        end_time: DateTime<Utc>,
        message: Option<&str>,
    ) -> StoreResult<bool>;

    /// Return a RUNNING task still owned by `worker_id` to WAITING, clearing
    /// its owner and start time. Returns whether the lease was released.
    async fn release_lease(&self, task_id: i64, worker_id: i64) -> StoreResult<bool>;

    /// Heartbeat: refresh `last_active_time` of a RUNNING task
    async fn touch_last_active(&self, task_id: i64, now: DateTime<Utc>) -> StoreResult<()>;

    async fn find_running_owned_by(&self, worker_id: i64) -> StoreResult<Vec<Task>>;

    /// Fail RUNNING tasks whose heartbeat is older than `active_threshold`.
    /// Tasks that never sent a heartbeat are left alone. Returns the count.
    async fn fail_orphan_tasks(
        &self,
        active_threshold: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Delete up to `limit` non-RUNNING tasks created before `cutoff`
    async fn purge_tasks_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<u64>;
}

/// Message recorded on a task swept by the orphan reaper
pub fn orphan_task_message(worker_id: Option<i64>) -> String {
    let worker = worker_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{}{}",
        crate::constants::housekeeping::ORPHAN_TASK_MESSAGE_PREFIX,
        worker
    )
}
