use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::worker_pool::{PoolError, WorkerPoolManager};
use crate::database::TaskStore;

/// Cancels its heartbeat ticker when dropped
#[derive(Debug)]
pub struct HeartbeatGuard {
    task_id: i64,
    handle: AbortHandle,
}

impl HeartbeatGuard {
    pub fn task_id(&self) -> i64 {
        self.task_id
    }
}

impl Drop for HeartbeatGuard {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(task_id = self.task_id, "Heartbeat cancelled");
    }
}

/// Refresh the task's `last_active_time` every `interval`, starting now.
///
/// Failed touches are logged and retried on the next tick.
pub async fn start_heartbeat(
    pool: &WorkerPoolManager,
    store: Arc<dyn TaskStore>,
    task_id: i64,
    interval: Duration,
) -> Result<HeartbeatGuard, PoolError> {
    let handle = pool
        .spawn_heartbeat(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = store.touch_last_active(task_id, Utc::now()).await {
                    warn!(task_id = task_id, error = %e, "Heartbeat failed");
                }
            }
        })
        .await?;
    Ok(HeartbeatGuard { task_id, handle })
}
