//! # Postgres Task Store
//!
//! `sqlx` implementation of [`TaskStore`] over the `detection_tasks` table.
//!
//! ## Atomicity
//!
//! The lease is one statement:
//!
//! ```sql
//! UPDATE detection_tasks
//!    SET status = 'RUNNING', worker_id = $1, version = version + 1, ...
//!  WHERE id = $3 AND version = $4 AND status = ANY($5)
//! ```
//!
//! and a caller won iff `rows_affected() == 1`. Postgres row locking makes
//! concurrent attempts on the same `(id, version)` serialize, so the second
//! one re-evaluates the predicate against the bumped version and matches
//! nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

use super::task_store::{orphan_task_message, StoreError, StoreResult, TaskStore};
use crate::models::{NewTask, Task};
use crate::state_machine::TaskStatus;

const TASK_COLUMNS: &str = "id, task_type, status, job_name, payload, worker_id, version, \
     create_time, start_time, end_time, last_active_time, message";

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: i64,
    task_type: String,
    status: String,
    job_name: String,
    payload: String,
    worker_id: Option<i64>,
    version: i64,
    create_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    last_active_time: Option<DateTime<Utc>>,
    message: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let task_type = row.task_type.parse().map_err(|reason| StoreError::CorruptRecord {
            task_id: row.id,
            reason,
        })?;
        let status = row.status.parse().map_err(|reason| StoreError::CorruptRecord {
            task_id: row.id,
            reason,
        })?;
        Ok(Task {
            id: row.id,
            task_type,
            status,
            job_name: row.job_name,
            payload: row.payload,
            worker_id: row.worker_id,
            version: row.version,
            create_time: row.create_time,
            start_time: row.start_time,
            end_time: row.end_time,
            last_active_time: row.last_active_time,
            message: row.message,
        })
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> StoreResult<Vec<Task>> {
    rows.into_iter().map(Task::try_from).collect()
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self, new_task), fields(job_name = %new_task.job_name))]
    async fn create_task(&self, new_task: NewTask) -> StoreResult<Task> {
        let query = format!(
            "INSERT INTO detection_tasks (task_type, status, job_name, payload, version, create_time) \
             VALUES ($1, $2, $3, $4, 0, $5) RETURNING {TASK_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TaskRow>(&query)
            .bind(new_task.task_type.as_str())
            .bind(TaskStatus::Waiting.as_str())
            .bind(&new_task.job_name)
            .bind(&new_task.payload)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to create task {}: {}", new_task.job_name, e);
                StoreError::database("create_task", e)
            })?;

        let task = Task::try_from(row)?;
        debug!(task_id = task.id, "Task created");
        Ok(task)
    }

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<Task>> {
        let query = format!("SELECT {TASK_COLUMNS} FROM detection_tasks WHERE id = $1");

        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::database("find_task", e))?
            .map(Task::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn find_waiting_ordered_by_create_time(
        &self,
        limit: i64,
        ascending: bool,
    ) -> StoreResult<Vec<Task>> {
        let direction = if ascending { "ASC" } else { "DESC" };
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM detection_tasks \
             WHERE status = $1 ORDER BY create_time {direction}, id {direction} LIMIT $2"
        );

        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(TaskStatus::Waiting.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch waiting tasks: {}", e);
                StoreError::database("find_waiting_ordered_by_create_time", e)
            })?;

        into_tasks(rows)
    }

    #[instrument(skip(self, allowed_statuses, start_time))]
    async fn conditional_set_running(
        &self,
        task_id: i64,
        expected_version: i64,
        allowed_statuses: &[TaskStatus],
        worker_id: i64,
        start_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let query = r#"
            UPDATE detection_tasks
               SET status = $1, worker_id = $2, version = version + 1,
                   start_time = $3, end_time = NULL, last_active_time = NULL, message = NULL
             WHERE id = $4 AND version = $5 AND status = ANY($6)
        "#;

        let allowed: Vec<String> = allowed_statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let result = sqlx::query(query)
            .bind(TaskStatus::Running.as_str())
            .bind(worker_id)
            .bind(start_time)
            .bind(task_id)
            .bind(expected_version)
            .bind(&allowed)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to acquire task {}: {}", task_id, e);
                StoreError::database("conditional_set_running", e)
            })?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, end_time, message))]
    async fn conditional_set_terminal(
        &self,
        task_id: i64,
        expected_status: TaskStatus,
        new_status: TaskStatus,
        end_time: DateTime<Utc>,
        message: Option<&str>,
    ) -> StoreResult<bool> {
        let query = r#"
            UPDATE detection_tasks
               SET status = $1, end_time = $2, message = $3
             WHERE id = $4 AND status = $5
        "#;

        let result = sqlx::query(query)
            .bind(new_status.as_str())
            .bind(end_time)
            .bind(message)
            .bind(task_id)
            .bind(expected_status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update task {} to {}: {}", task_id, new_status, e);
                StoreError::database("conditional_set_terminal", e)
            })?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn release_lease(&self, task_id: i64, worker_id: i64) -> StoreResult<bool> {
        let query = r#"
            UPDATE detection_tasks
               SET status = $1, worker_id = NULL, start_time = NULL, last_active_time = NULL
             WHERE id = $2 AND worker_id = $3 AND status = $4
        "#;

        let result = sqlx::query(query)
            .bind(TaskStatus::Waiting.as_str())
            .bind(task_id)
            .bind(worker_id)
            .bind(TaskStatus::Running.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to release task {}: {}", task_id, e);
                StoreError::database("release_lease", e)
            })?;

        Ok(result.rows_affected() == 1)
    }

    async fn touch_last_active(&self, task_id: i64, now: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE detection_tasks SET last_active_time = $1 WHERE id = $2 AND status = $3")
            .bind(now)
            .bind(task_id)
            .bind(TaskStatus::Running.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("touch_last_active", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_running_owned_by(&self, worker_id: i64) -> StoreResult<Vec<Task>> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM detection_tasks WHERE status = $1 AND worker_id = $2 ORDER BY id"
        );

        let rows = sqlx::query_as::<_, TaskRow>(&query)
            .bind(TaskStatus::Running.as_str())
            .bind(worker_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::database("find_running_owned_by", e))?;

        into_tasks(rows)
    }

    #[instrument(skip(self))]
    async fn fail_orphan_tasks(
        &self,
        active_threshold: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::database("fail_orphan_tasks", e))?;

        let orphans: Vec<(i64, Option<i64>)> = sqlx::query_as(
            "SELECT id, worker_id FROM detection_tasks \
             WHERE status = $1 AND last_active_time < $2 FOR UPDATE SKIP LOCKED",
        )
        .bind(TaskStatus::Running.as_str())
        .bind(active_threshold)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StoreError::database("fail_orphan_tasks", e))?;

        let mut failed = 0;
        for (task_id, worker_id) in orphans {
            let result = sqlx::query(
                "UPDATE detection_tasks SET status = $1, end_time = $2, message = $3 \
                 WHERE id = $4 AND status = $5",
            )
            .bind(TaskStatus::Failed.as_str())
            .bind(end_time)
            .bind(orphan_task_message(worker_id))
            .bind(task_id)
            .bind(TaskStatus::Running.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::database("fail_orphan_tasks", e))?;
            failed += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::database("fail_orphan_tasks", e))?;

        if failed > 0 {
            info!(failed_count = failed, "Orphan tasks marked as FAILED");
        }
        Ok(failed)
    }

    #[instrument(skip(self))]
    async fn purge_tasks_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<u64> {
        let query = r#"
            DELETE FROM detection_tasks
             WHERE id IN (
                SELECT id FROM detection_tasks
                 WHERE create_time < $1 AND status <> $2
                 ORDER BY id
                 LIMIT $3
             )
        "#;

        let result = sqlx::query(query)
            .bind(cutoff)
            .bind(TaskStatus::Running.as_str())
            .bind(limit)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::database("purge_tasks_created_before", e))?;

        info!(deleted_count = result.rows_affected(), "Expired tasks purged");
        Ok(result.rows_affected())
    }
}
