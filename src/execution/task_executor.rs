//! # Task Execution
//!
//! Runs one leased task to a terminal status.
//!
//! The payload is decoded by task type, the matching runner is submitted to
//! the execution pool and awaited. `max_task_run_time` bounds the wait for an
//! execution slot and the run together. A random worker identity keeps the
//! task's `last_active_time` fresh meanwhile.
//!
//! | runner result | persisted status | message |
//! |---|---|---|
//! | `Ok(results)` | COMPLETED | none |
//! | `Err(e)` | FAILED | `e` and its cause chain |
//! | deadline passed | TIMEOUT | timeout detail |
//! | pool already drained | WAITING | none, lease released |
//!
//! Every terminal write is conditional on the task still being RUNNING; a
//! rejected write is logged and not retried.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use super::heartbeat::{start_heartbeat, HeartbeatGuard};
use super::metrics::TaskDriverMetrics;
use super::worker_identity::WorkerIdentity;
use super::worker_pool::{PoolError, WorkerPoolManager};
use crate::config::TaskDriverConfig;
use crate::database::TaskStore;
use crate::error::error_report;
use crate::logging::log_task_operation;
use crate::models::{Task, TaskInfo, TaskResult};
use crate::registry::{TaskContext, TaskRunnerRegistry};
use crate::state_machine::TaskStatus;

/// How a task execution ended
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Completed(Vec<TaskResult>),
    Failed(String),
    TimedOut,
    /// Never started; the lease went back to WAITING
    Released,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Failed,
            Self::TimedOut => TaskStatus::Timeout,
            Self::Released => TaskStatus::Waiting,
        }
    }
}

pub struct TaskExecutor {
    store: Arc<dyn TaskStore>,
    runners: TaskRunnerRegistry,
    pool: Arc<WorkerPoolManager>,
    identity: WorkerIdentity,
    config: TaskDriverConfig,
    metrics: Arc<TaskDriverMetrics>,
}

impl TaskExecutor {
    pub fn new(
        store: Arc<dyn TaskStore>,
        runners: TaskRunnerRegistry,
        pool: Arc<WorkerPoolManager>,
        identity: WorkerIdentity,
        config: TaskDriverConfig,
        metrics: Arc<TaskDriverMetrics>,
    ) -> Self {
        Self {
            store,
            runners,
            pool,
            identity,
            config,
            metrics,
        }
    }

    /// Execute a task this worker has leased and persist its outcome
    #[instrument(skip(self, task), fields(task_id = task.id, job_name = %task.job_name, worker_id = self.identity.id()))]
    pub async fn execute(&self, task: &Task) -> TaskOutcome {
        self.metrics.record_task_started();
        log_task_operation(
            "execute",
            task.id,
            Some(&task.job_name),
            self.identity.id(),
            TaskStatus::Running.as_str(),
            None,
        );

        let outcome = self.run(task).await;

        let (message, status) = match &outcome {
            TaskOutcome::Completed(results) => {
                self.metrics.record_task_succeeded();
                info!(result_count = results.len(), "✅ Task completed");
                (None, TaskStatus::Completed)
            }
            TaskOutcome::Failed(message) => {
                self.metrics.record_task_failed();
                warn!(error = %message, "❌ Task failed");
                (Some(message.clone()), TaskStatus::Failed)
            }
            TaskOutcome::TimedOut => {
                self.metrics.record_task_timed_out();
                let message = format!(
                    "Task exceeded max run time of {} ms",
                    self.config.max_task_run_time_ms
                );
                warn!(error = %message, "⏰ Task timed out");
                (Some(message), TaskStatus::Timeout)
            }
            TaskOutcome::Released => {
                self.release(task).await;
                return outcome;
            }
        };
        self.record_terminal(task, status, message.as_deref()).await;
        outcome
    }

    async fn run(&self, task: &Task) -> TaskOutcome {
        let info = match TaskInfo::from_payload(task.task_type, &task.payload) {
            Ok(info) => info,
            Err(e) => return TaskOutcome::Failed(error_report(&e)),
        };
        let Some(runner) = self.runners.get(task.task_type) else {
            return TaskOutcome::Failed(format!(
                "No task runner registered for task type {}",
                task.task_type
            ));
        };

        let _heartbeat = self.start_heartbeat(task.id).await;

        let ctx = TaskContext {
            task_id: task.id,
            job_name: task.job_name.clone(),
            worker_id: self.identity.id(),
        };
        let deadline = tokio::time::Instant::now() + self.config.max_task_run_time();
        let submitted = tokio::time::timeout_at(
            deadline,
            self.pool
                .submit(async move { runner.execute(info, &ctx).await }),
        )
        .await;
        let mut handle = match submitted {
            Ok(Ok(handle)) => handle,
            Ok(Err(PoolError::ShuttingDown)) => return TaskOutcome::Released,
            Ok(Err(e)) => return TaskOutcome::Failed(error_report(&e)),
            Err(_) => {
                warn!(
                    available_permits = self.pool.available_permits(),
                    "No execution slot freed before the deadline"
                );
                return TaskOutcome::TimedOut;
            }
        };

        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(Ok(results))) => TaskOutcome::Completed(results),
            Ok(Ok(Err(e))) => TaskOutcome::Failed(error_report(&e)),
            Ok(Err(join_error)) => {
                TaskOutcome::Failed(format!("Task execution aborted: {join_error}"))
            }
            Err(_) => {
                handle.abort();
                TaskOutcome::TimedOut
            }
        }
    }

    /// Only random identities heartbeat; a fixed id is recovered at restart
    async fn start_heartbeat(&self, task_id: i64) -> Option<HeartbeatGuard> {
        if !self.identity.is_random() {
            return None;
        }
        match start_heartbeat(
            &self.pool,
            Arc::clone(&self.store),
            task_id,
            self.config.heartbeat_interval(),
        )
        .await
        {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(task_id = task_id, error = %e, "Heartbeat not started");
                None
            }
        }
    }

    async fn release(&self, task: &Task) {
        match self.store.release_lease(task.id, self.identity.id()).await {
            Ok(true) => info!("↩️ Pool drained before execution; task returned to WAITING"),
            Ok(false) => warn!("Lease release rejected; task is no longer ours"),
            Err(e) => error!(error = %e, "Failed to release task lease"),
        }
    }

    async fn record_terminal(&self, task: &Task, status: TaskStatus, message: Option<&str>) {
        match self
            .store
            .conditional_set_terminal(task.id, TaskStatus::Running, status, Utc::now(), message)
            .await
        {
            Ok(true) => {
                debug!(status = %status, "Terminal status recorded");
                log_task_operation(
                    "finish",
                    task.id,
                    Some(&task.job_name),
                    self.identity.id(),
                    status.as_str(),
                    message,
                );
            }
            Ok(false) => warn!(
                status = %status,
                "Terminal status rejected; task is no longer RUNNING"
            ),
            Err(e) => error!(status = %status, error = %e, "Failed to record terminal status"),
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("identity", &self.identity)
            .field("runners", &self.runners)
            .finish()
    }
}
