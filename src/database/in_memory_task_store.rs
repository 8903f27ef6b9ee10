//! In-process [`TaskStore`] used by tests and embedded runs.
//!
//! Every operation takes the same mutex for its whole read-check-write, which
//! gives it the same single-winner semantics as the conditional SQL updates.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::task_store::{orphan_task_message, StoreResult, TaskStore};
use crate::models::{NewTask, Task};
use crate::state_machine::TaskStatus;

#[derive(Debug, Default)]
struct InMemoryState {
    next_id: i64,
    tasks: BTreeMap<i64, Task>,
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: Mutex<InMemoryState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully specified record, replacing any task with the same id
    pub fn insert_raw(&self, task: Task) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(task.id);
        state.tasks.insert(task.id, task);
    }

    /// Snapshot of every stored task ordered by id
    pub fn all_tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create_task(&self, new_task: NewTask) -> StoreResult<Task> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let task = Task {
            id: state.next_id,
            task_type: new_task.task_type,
            status: TaskStatus::Waiting,
            job_name: new_task.job_name,
            payload: new_task.payload,
            worker_id: None,
            version: 0,
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            last_active_time: None,
            message: None,
        };
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<Task>> {
        Ok(self.state.lock().tasks.get(&task_id).cloned())
    }

    async fn find_waiting_ordered_by_create_time(
        &self,
        limit: i64,
        ascending: bool,
    ) -> StoreResult<Vec<Task>> {
        let state = self.state.lock();
        let mut waiting: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by_key(|t| (t.create_time, t.id));
        if !ascending {
            waiting.reverse();
        }
        waiting.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(waiting)
    }

    async fn conditional_set_running(
        &self,
        task_id: i64,
        expected_version: i64,
        allowed_statuses: &[TaskStatus],
        worker_id: i64,
        start_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(false);
        };
        if task.version != expected_version || !allowed_statuses.contains(&task.status) {
            return Ok(false);
        }
        task.status = TaskStatus::Running;
        task.worker_id = Some(worker_id);
        task.version += 1;
        task.start_time = Some(start_time);
        task.end_time = None;
        task.last_active_time = None;
        task.message = None;
        Ok(true)
    }

    async fn conditional_set_terminal(
        &self,
        task_id: i64,
        expected_status: TaskStatus,
        new_status: TaskStatus,
        end_time: DateTime<Utc>,
        message: Option<&str>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(false);
        };
        if task.status != expected_status || !task.status.can_transition_to(new_status) {
            return Ok(false);
        }
        task.status = new_status;
        task.end_time = Some(end_time);
        task.message = message.map(str::to_string);
        Ok(true)
    }

    async fn release_lease(&self, task_id: i64, worker_id: i64) -> StoreResult<bool> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(false);
        };
        if !task.is_owned_by(worker_id) || !task.status.can_transition_to(TaskStatus::Waiting) {
            return Ok(false);
        }
        task.status = TaskStatus::Waiting;
        task.worker_id = None;
        task.start_time = None;
        task.last_active_time = None;
        Ok(true)
    }

    async fn touch_last_active(&self, task_id: i64, now: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock();
        if let Some(task) = state.tasks.get_mut(&task_id) {
            if task.status.is_active() {
                task.last_active_time = Some(now);
            }
        }
        Ok(())
    }

    async fn find_running_owned_by(&self, worker_id: i64) -> StoreResult<Vec<Task>> {
        Ok(self
            .state
            .lock()
            .tasks
            .values()
            .filter(|t| t.status.is_active() && t.is_owned_by(worker_id))
            .cloned()
            .collect())
    }

    async fn fail_orphan_tasks(
        &self,
        active_threshold: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let mut failed = 0;
        for task in state.tasks.values_mut() {
            let stale = task
                .last_active_time
                .is_some_and(|last_active| last_active < active_threshold);
            if task.status.is_active() && stale {
                task.status = TaskStatus::Failed;
                task.end_time = Some(end_time);
                task.message = Some(orphan_task_message(task.worker_id));
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn purge_tasks_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let expired: Vec<i64> = state
            .tasks
            .values()
            .filter(|t| t.create_time < cutoff && !t.status.is_active())
            .map(|t| t.id)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect();
        for id in &expired {
            state.tasks.remove(id);
        }
        Ok(expired.len() as u64)
    }
}
