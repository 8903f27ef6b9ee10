//! # Worker Pool Manager
//!
//! Owns every task the task driver spawns, split in three pools:
//!
//! - **executions**: task runner invocations, bounded by `max_parallel_tasks`
//!   semaphore permits
//! - **watchers**: the long-lived poll loops
//! - **heartbeats**: liveness tickers, one per running task
//!
//! The shutdown flag is written with `Release` and read with `Acquire`.
//! Setting it wakes every sleeping loop; [`WorkerPoolManager::shutdown`] then
//! waits for the loops to finish their in-flight task before draining the
//! other pools.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Worker pool is shut down; submission refused")]
    ShuttingDown,

    #[error("Task execution did not finish: {0}")]
    Join(String),
}

pub struct WorkerPoolManager {
    shutdown: AtomicBool,
    shutdown_notify: Notify,
    max_parallel_tasks: usize,
    execution_permits: Arc<Semaphore>,
    watchers: Mutex<JoinSet<()>>,
    heartbeats: Mutex<JoinSet<()>>,
}

impl WorkerPoolManager {
    pub fn new(max_parallel_tasks: usize) -> Self {
        let max_parallel_tasks = max_parallel_tasks.max(1);
        Self {
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            max_parallel_tasks,
            execution_permits: Arc::new(Semaphore::new(max_parallel_tasks)),
            watchers: Mutex::new(JoinSet::new()),
            heartbeats: Mutex::new(JoinSet::new()),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn max_parallel_tasks(&self) -> usize {
        self.max_parallel_tasks
    }

    /// Execution slots currently free
    pub fn available_permits(&self) -> usize {
        self.execution_permits.available_permits()
    }

    /// Run `future` in the execution pool once a permit is free.
    ///
    /// The permit is held by the spawned task, so aborting the returned
    /// handle releases it. Submissions are accepted until [`Self::shutdown`]
    /// has drained the poll loops, so a loop that leased a task before the
    /// shutdown request still runs it.
    pub async fn submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>, PoolError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permit = Arc::clone(&self.execution_permits)
            .acquire_owned()
            .await
            .map_err(|_| PoolError::ShuttingDown)?;
        Ok(tokio::spawn(async move {
            let _permit = permit;
            future.await
        }))
    }

    /// Spawn a long-lived poll loop
    pub async fn spawn_watcher<F>(&self, future: F) -> Result<(), PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(PoolError::ShuttingDown);
        }
        self.watchers.lock().await.spawn(future);
        Ok(())
    }

    /// Spawn a heartbeat ticker; the caller cancels it through the handle
    pub async fn spawn_heartbeat<F>(&self, future: F) -> Result<AbortHandle, PoolError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(PoolError::ShuttingDown);
        }
        let mut heartbeats = self.heartbeats.lock().await;
        // Reap tickers that were already cancelled
        while heartbeats.try_join_next().is_some() {}
        Ok(heartbeats.spawn(future))
    }

    /// Sleep for `duration` unless shutdown is requested first.
    /// Returns `true` when the pool is shutting down.
    pub async fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let notified = self.shutdown_notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent shutdown cannot be missed
        notified.as_mut().enable();
        if self.is_shutdown() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_shutdown(),
            _ = notified => true,
        }
    }

    /// Stop accepting work, wake sleeping loops and drain all pools.
    ///
    /// In-flight executions are not cancelled: poll loops exit after the task
    /// they are currently running.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            debug!("Worker pool shutdown already requested");
            return;
        }
        info!("🛑 Worker pool shutting down");
        self.shutdown_notify.notify_waiters();

        let mut watchers = std::mem::take(&mut *self.watchers.lock().await);
        while let Some(result) = watchers.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Poll loop ended abnormally");
            }
        }

        // Every permit back means no execution is still running
        let permits = u32::try_from(self.max_parallel_tasks).unwrap_or(u32::MAX);
        match self.execution_permits.acquire_many(permits).await {
            Ok(all) => {
                all.forget();
                self.execution_permits.close();
            }
            Err(_) => debug!("Execution pool already closed"),
        }

        let mut heartbeats = std::mem::take(&mut *self.heartbeats.lock().await);
        heartbeats.shutdown().await;

        info!("✅ Worker pool drained");
    }
}

impl std::fmt::Debug for WorkerPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPoolManager")
            .field("shutdown", &self.is_shutdown())
            .field("max_parallel_tasks", &self.max_parallel_tasks)
            .field("available_permits", &self.available_permits())
            .finish()
    }
}
