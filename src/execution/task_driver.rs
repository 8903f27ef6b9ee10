//! # Task Driver
//!
//! Entry point of a worker process's task execution.
//!
//! Startup resolves the worker identity, fails every task this identity
//! left RUNNING in a previous life, then launches `max_parallel_tasks`
//! independent poll loops. There is no in-process coordination between the
//! loops; the store arbitrates every lease.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use detection_engine::config::EngineConfig;
//! use detection_engine::database::InMemoryTaskStore;
//! use detection_engine::execution::TaskDriver;
//! use detection_engine::registry::TaskRunnerRegistry;
//!
//! # async fn example() -> detection_engine::Result<()> {
//! let config = EngineConfig::default();
//! let driver = TaskDriver::new(
//!     &config,
//!     Arc::new(InMemoryTaskStore::new()),
//!     TaskRunnerRegistry::new(),
//! )?;
//! driver.start().await?;
//! // ...
//! driver.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use super::metrics::{TaskDriverMetrics, TaskDriverMetricsSnapshot};
use super::task_executor::TaskExecutor;
use super::task_poller::TaskPoller;
use super::worker_identity::WorkerIdentity;
use super::worker_pool::WorkerPoolManager;
use crate::config::{EngineConfig, TaskDriverConfig};
use crate::constants::LEFTOVER_TASK_MESSAGE;
use crate::database::TaskStore;
use crate::error::Result;
use crate::registry::TaskRunnerRegistry;
use crate::state_machine::TaskStatus;

pub struct TaskDriver {
    identity: WorkerIdentity,
    config: TaskDriverConfig,
    store: Arc<dyn TaskStore>,
    pool: Arc<WorkerPoolManager>,
    executor: Arc<TaskExecutor>,
    metrics: Arc<TaskDriverMetrics>,
}

impl TaskDriver {
    /// Resolve the worker identity and wire the driver; nothing runs yet
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn TaskStore>,
        runners: TaskRunnerRegistry,
    ) -> Result<Self> {
        let identity = WorkerIdentity::from_config(&config.worker)?;
        Ok(Self::with_identity(
            identity,
            config.task_driver.clone(),
            store,
            runners,
        ))
    }

    pub fn with_identity(
        identity: WorkerIdentity,
        config: TaskDriverConfig,
        store: Arc<dyn TaskStore>,
        runners: TaskRunnerRegistry,
    ) -> Self {
        let pool = Arc::new(WorkerPoolManager::new(config.max_parallel_tasks));
        let metrics = Arc::new(TaskDriverMetrics::new());
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&store),
            runners,
            Arc::clone(&pool),
            identity,
            config.clone(),
            Arc::clone(&metrics),
        ));
        Self {
            identity,
            config,
            store,
            pool,
            executor,
            metrics,
        }
    }

    pub fn worker_id(&self) -> i64 {
        self.identity.id()
    }

    pub fn identity(&self) -> WorkerIdentity {
        self.identity
    }

    pub fn metrics(&self) -> TaskDriverMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    /// Recover leftovers, then launch the poll loops
    #[instrument(skip(self), fields(worker_id = self.identity.id()))]
    pub async fn start(&self) -> Result<()> {
        let recovered = self.recover_leftover_tasks().await?;
        info!(
            random_worker_id = self.identity.is_random(),
            recovered = recovered,
            loops = self.config.max_parallel_tasks,
            "🚀 Starting task driver"
        );

        for loop_index in 0..self.config.max_parallel_tasks {
            let poller = TaskPoller::new(
                loop_index,
                Arc::clone(&self.store),
                Arc::clone(&self.executor),
                Arc::clone(&self.pool),
                self.identity,
                self.config.clone(),
                Arc::clone(&self.metrics),
            );
            self.pool.spawn_watcher(poller.run()).await?;
        }
        Ok(())
    }

    /// Fail every task still RUNNING under this worker id.
    ///
    /// Only this worker's own tasks are touched; orphans of other workers are
    /// the reaper's job.
    pub async fn recover_leftover_tasks(&self) -> Result<usize> {
        let leftovers = self.store.find_running_owned_by(self.identity.id()).await?;
        let mut recovered = 0;
        for task in leftovers {
            let updated = self
                .store
                .conditional_set_terminal(
                    task.id,
                    TaskStatus::Running,
                    TaskStatus::Failed,
                    Utc::now(),
                    Some(LEFTOVER_TASK_MESSAGE),
                )
                .await?;
            if updated {
                recovered += 1;
                info!(task_id = task.id, job_name = %task.job_name, "Failed leftover task");
            } else {
                warn!(task_id = task.id, "Leftover task changed status concurrently");
            }
        }
        self.metrics.record_leftover_recovered(recovered as u64);
        Ok(recovered)
    }

    /// Stop polling; returns once every loop has finished its current task
    pub async fn shutdown(&self) {
        info!(worker_id = self.identity.id(), "Shutting down task driver");
        self.pool.shutdown().await;
    }
}

impl std::fmt::Debug for TaskDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDriver")
            .field("identity", &self.identity)
            .field("pool", &self.pool)
            .finish()
    }
}
