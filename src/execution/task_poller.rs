//! # Poll Loop
//!
//! Each loop repeatedly leases one task and executes it:
//!
//! 1. fetch up to `task_fetch_size_cap` WAITING tasks by creation time, the
//!    direction picked from the parity of the current time
//! 2. shuffle them and try to lease each in turn, stopping at the first win
//! 3. execute the leased task, or back off when nothing was leased
//!
//! Several loops (and several processes) race on the same candidates; the
//! store's conditional update decides who wins. Store errors never end the
//! loop: they are logged and followed by `task_failure_delay`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info};

use super::metrics::TaskDriverMetrics;
use super::task_executor::TaskExecutor;
use super::worker_identity::WorkerIdentity;
use super::worker_pool::WorkerPoolManager;
use crate::config::TaskDriverConfig;
use crate::constants::status_groups::ACQUIRABLE_STATUSES;
use crate::database::{StoreResult, TaskStore};
use crate::models::Task;
use crate::state_machine::TaskStatus;

/// Lease the next runnable task for `worker_id`, if any candidate can be won
pub async fn acquire_next_task_to_run(
    store: &dyn TaskStore,
    worker_id: i64,
    fetch_size: i64,
    metrics: &TaskDriverMetrics,
) -> StoreResult<Option<Task>> {
    let ascending = Utc::now().timestamp_millis() % 2 == 0;
    let mut candidates = store
        .find_waiting_ordered_by_create_time(fetch_size, ascending)
        .await?;
    candidates.shuffle(&mut rand::thread_rng());

    for mut task in candidates {
        let acquired_at = Utc::now();
        let won = store
            .conditional_set_running(
                task.id,
                task.version,
                ACQUIRABLE_STATUSES,
                worker_id,
                acquired_at,
            )
            .await?;
        if won {
            metrics.record_wait_time(task.wait_time(acquired_at));
            task.status = TaskStatus::Running;
            task.worker_id = Some(worker_id);
            task.version += 1;
            task.start_time = Some(acquired_at);
            task.end_time = None;
            task.last_active_time = None;
            task.message = None;
            return Ok(Some(task));
        }
        metrics.record_lost_acquisition();
        debug!(task_id = task.id, version = task.version, "Lost lease race");
    }
    Ok(None)
}

enum PollResult {
    Executed,
    NoTask,
    StoreFailure,
}

pub struct TaskPoller {
    loop_index: usize,
    store: Arc<dyn TaskStore>,
    executor: Arc<TaskExecutor>,
    pool: Arc<WorkerPoolManager>,
    identity: WorkerIdentity,
    config: TaskDriverConfig,
    metrics: Arc<TaskDriverMetrics>,
}

impl TaskPoller {
    pub fn new(
        loop_index: usize,
        store: Arc<dyn TaskStore>,
        executor: Arc<TaskExecutor>,
        pool: Arc<WorkerPoolManager>,
        identity: WorkerIdentity,
        config: TaskDriverConfig,
        metrics: Arc<TaskDriverMetrics>,
    ) -> Self {
        Self {
            loop_index,
            store,
            executor,
            pool,
            identity,
            config,
            metrics,
        }
    }

    /// Poll until the pool shuts down
    pub async fn run(self) {
        info!(
            loop_index = self.loop_index,
            worker_id = self.identity.id(),
            "🔄 Poll loop started"
        );
        while !self.pool.is_shutdown() {
            let delay = match self.poll_once().await {
                PollResult::Executed => continue,
                PollResult::NoTask => self.idle_delay(),
                PollResult::StoreFailure => self.config.task_failure_delay(),
            };
            if self.pool.sleep_unless_shutdown(delay).await {
                break;
            }
        }
        info!(loop_index = self.loop_index, "Poll loop stopped");
    }

    async fn poll_once(&self) -> PollResult {
        let acquired = acquire_next_task_to_run(
            self.store.as_ref(),
            self.identity.id(),
            self.config.task_fetch_size_cap,
            &self.metrics,
        )
        .await;

        match acquired {
            Ok(Some(task)) => {
                self.executor.execute(&task).await;
                PollResult::Executed
            }
            Ok(None) => {
                self.metrics.record_empty_poll();
                PollResult::NoTask
            }
            Err(e) => {
                self.metrics.record_fetch_error();
                error!(loop_index = self.loop_index, error = %e, "Failed to acquire a task");
                PollResult::StoreFailure
            }
        }
    }

    /// `no_task_delay` plus jitter in `[0, random_delay_cap)`
    fn idle_delay(&self) -> Duration {
        let cap = self.config.random_delay_cap_ms;
        let jitter = if cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..cap)
        };
        self.config.no_task_delay() + Duration::from_millis(jitter)
    }
}
