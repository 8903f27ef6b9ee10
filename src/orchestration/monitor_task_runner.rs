//! Housekeeping for the task table, run as MONITOR tasks.
//!
//! - `UPDATE` fails RUNNING tasks whose heartbeat went silent for longer than
//!   `heartbeat_interval * active_threshold_multiplier`.
//! - `EXPIRE` deletes tasks older than the requested number of days.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde_json::json;
use tracing::info;

use crate::config::TaskDriverConfig;
use crate::constants::housekeeping::{DEFAULT_TASK_EXPIRE_DAYS, TASK_PURGE_LIMIT};
use crate::database::TaskStore;
use crate::models::{MonitorTaskInfo, MonitorType, TaskInfo, TaskResult};
use crate::registry::{TaskContext, TaskRunner, TaskRunnerError};

pub const ORPHAN_TASKS_RESULT_KEY: &str = "orphanTasks";
pub const EXPIRED_TASKS_RESULT_KEY: &str = "expiredTasks";

pub struct MonitorTaskRunner {
    store: Arc<dyn TaskStore>,
    config: TaskDriverConfig,
}

impl MonitorTaskRunner {
    pub fn new(store: Arc<dyn TaskStore>, config: TaskDriverConfig) -> Self {
        Self { store, config }
    }

    async fn fail_orphans(&self) -> Result<TaskResult, TaskRunnerError> {
        let now = Utc::now();
        let cutoff = self
            .config
            .active_threshold()
            .and_then(|threshold| TimeDelta::from_std(threshold).ok())
            .and_then(|threshold| now.checked_sub_signed(threshold))
            .ok_or_else(|| {
                TaskRunnerError::Other(format!(
                    "invalid active threshold: {} ms x {}",
                    self.config.heartbeat_interval_ms, self.config.active_threshold_multiplier
                ))
            })?;
        let failed = self.store.fail_orphan_tasks(cutoff, now).await?;
        info!(failed = failed, "🧹 Orphan tasks failed");
        Ok(TaskResult::new(
            ORPHAN_TASKS_RESULT_KEY,
            "monitor",
            json!({ "failed": failed }),
        ))
    }

    async fn purge_expired(&self, info: &MonitorTaskInfo) -> Result<TaskResult, TaskRunnerError> {
        let days = info.expire.unwrap_or(DEFAULT_TASK_EXPIRE_DAYS);
        let retention = TimeDelta::try_days(days)
            .filter(|d| *d > TimeDelta::zero())
            .ok_or_else(|| TaskRunnerError::Other(format!("invalid expire days: {days}")))?;
        let purged = self
            .store
            .purge_tasks_created_before(Utc::now() - retention, TASK_PURGE_LIMIT)
            .await?;
        info!(purged = purged, expire_days = days, "🧹 Expired tasks purged");
        Ok(TaskResult::new(
            EXPIRED_TASKS_RESULT_KEY,
            "monitor",
            json!({ "purged": purged, "expireDays": days }),
        ))
    }
}

#[async_trait]
impl TaskRunner for MonitorTaskRunner {
    async fn execute(
        &self,
        info: TaskInfo,
        _ctx: &TaskContext,
    ) -> Result<Vec<TaskResult>, TaskRunnerError> {
        let task_type = info.task_type();
        let TaskInfo::Monitor(monitor) = info else {
            return Err(TaskRunnerError::UnsupportedTaskInfo {
                runner: "MonitorTaskRunner",
                task_type,
            });
        };
        let result = match monitor.monitor_type {
            MonitorType::Update => self.fail_orphans().await?,
            MonitorType::Expire => self.purge_expired(&monitor).await?,
        };
        Ok(vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryTaskStore;
    use crate::models::{NewTask, TaskType};
    use crate::state_machine::TaskStatus;

    fn ctx() -> TaskContext {
        TaskContext {
            task_id: 100,
            job_name: "MONITOR_1".into(),
            worker_id: 1,
        }
    }

    #[tokio::test]
    async fn test_update_fails_silent_tasks() {
        let store = Arc::new(InMemoryTaskStore::new());
        let task = store
            .create_task(NewTask::new(TaskType::Detection, 1, "{}"))
            .await
            .unwrap();
        let long_ago = Utc::now() - TimeDelta::hours(2);
        assert!(store
            .conditional_set_running(task.id, 0, &[TaskStatus::Waiting], 5, long_ago)
            .await
            .unwrap());
        store.touch_last_active(task.id, long_ago).await.unwrap();

        let runner = MonitorTaskRunner::new(store.clone(), TaskDriverConfig::default());
        let info = TaskInfo::Monitor(MonitorTaskInfo {
            monitor_type: MonitorType::Update,
            expire: None,
        });
        let results = runner.execute(info, &ctx()).await.unwrap();

        assert_eq!(results[0].summary, json!({ "failed": 1 }));
        let swept = store.find_task(task.id).await.unwrap().unwrap();
        assert_eq!(swept.status, TaskStatus::Failed);
        assert_eq!(swept.message.as_deref(), Some("Orphan Task. Worker id : 5"));
    }

    #[tokio::test]
    async fn test_runner_rejects_other_payloads() {
        let runner = MonitorTaskRunner::new(
            Arc::new(InMemoryTaskStore::new()),
            TaskDriverConfig::default(),
        );
        let info = TaskInfo::Notification(crate::models::NotificationTaskInfo {
            subscription_group_id: 1,
        });
        assert!(matches!(
            runner.execute(info, &ctx()).await,
            Err(TaskRunnerError::UnsupportedTaskInfo { .. })
        ));
    }

    #[tokio::test]
    async fn test_expire_rejects_non_positive_retention() {
        let runner = MonitorTaskRunner::new(
            Arc::new(InMemoryTaskStore::new()),
            TaskDriverConfig::default(),
        );
        let info = TaskInfo::Monitor(MonitorTaskInfo {
            monitor_type: MonitorType::Expire,
            expire: Some(0),
        });
        assert!(runner.execute(info, &ctx()).await.is_err());
    }

    #[tokio::test]
    async fn test_update_rejects_overflowing_threshold() {
        let config = TaskDriverConfig {
            heartbeat_interval_ms: u64::MAX,
            active_threshold_multiplier: 2,
            ..TaskDriverConfig::default()
        };
        let runner = MonitorTaskRunner::new(Arc::new(InMemoryTaskStore::new()), config);
        let info = TaskInfo::Monitor(MonitorTaskInfo {
            monitor_type: MonitorType::Update,
            expire: None,
        });

        let err = runner.execute(info, &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("invalid active threshold"));
    }
}
