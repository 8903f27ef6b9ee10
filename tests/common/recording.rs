//! Test doubles that record what the engine did to them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

use detection_engine::database::{InMemoryTaskStore, StoreError, StoreResult, TaskStore};
use detection_engine::models::{NewTask, Task, TaskInfo, TaskResult};
use detection_engine::pipeline::operator::single_output;
use detection_engine::pipeline::{
    ExecutionContext, Operator, OperatorContext, OperatorFactory, OperatorOutputs,
    OperatorResult, PipelineError, PipelineResult,
};
use detection_engine::registry::{TaskContext, TaskRunner, TaskRunnerError};
use detection_engine::TaskStatus;

/// In-memory store that timestamps fetches and can be told to fail them
#[derive(Default)]
pub struct RecordingStore {
    pub inner: InMemoryTaskStore,
    fetches: Mutex<Vec<Instant>>,
    touches: AtomicUsize,
    fail_fetches: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().clone()
    }

    pub fn touch_count(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn task(&self, id: i64) -> Task {
        self.inner
            .all_tasks()
            .into_iter()
            .find(|t| t.id == id)
            .expect("task exists")
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    async fn create_task(&self, new_task: NewTask) -> StoreResult<Task> {
        self.inner.create_task(new_task).await
    }

    async fn find_task(&self, task_id: i64) -> StoreResult<Option<Task>> {
        self.inner.find_task(task_id).await
    }

    async fn find_waiting_ordered_by_create_time(
        &self,
        limit: i64,
        ascending: bool,
    ) -> StoreResult<Vec<Task>> {
        self.fetches.lock().push(Instant::now());
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "injected fetch failure".to_string(),
            });
        }
        self.inner
            .find_waiting_ordered_by_create_time(limit, ascending)
            .await
    }

    async fn conditional_set_running(
        &self,
        task_id: i64,
        expected_version: i64,
        allowed_statuses: &[TaskStatus],
        worker_id: i64,
        start_time: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner
            .conditional_set_running(task_id, expected_version, allowed_statuses, worker_id, start_time)
            .await
    }

    async fn conditional_set_terminal(
        &self,
        task_id: i64,
        expected_status: TaskStatus,
        new_status: TaskStatus,
        end_time: DateTime<Utc>,
        message: Option<&str>,
    ) -> StoreResult<bool> {
        self.inner
            .conditional_set_terminal(task_id, expected_status, new_status, end_time, message)
            .await
    }

    async fn release_lease(&self, task_id: i64, worker_id: i64) -> StoreResult<bool> {
        self.inner.release_lease(task_id, worker_id).await
    }

    async fn touch_last_active(&self, task_id: i64, now: DateTime<Utc>) -> StoreResult<()> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        self.inner.touch_last_active(task_id, now).await
    }

    async fn find_running_owned_by(&self, worker_id: i64) -> StoreResult<Vec<Task>> {
        self.inner.find_running_owned_by(worker_id).await
    }

    async fn fail_orphan_tasks(
        &self,
        active_threshold: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> StoreResult<u64> {
        self.inner.fail_orphan_tasks(active_threshold, end_time).await
    }

    async fn purge_tasks_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<u64> {
        self.inner.purge_tasks_created_before(cutoff, limit).await
    }
}

#[derive(Debug, Clone)]
pub enum RunnerBehavior {
    Succeed,
    Fail(String),
    /// Sleep, then succeed
    Sleep(Duration),
}

/// Runner whose behavior is fixed up front; counts its invocations
pub struct ScriptedRunner {
    behavior: RunnerBehavior,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(behavior: RunnerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    async fn execute(
        &self,
        _info: TaskInfo,
        ctx: &TaskContext,
    ) -> Result<Vec<TaskResult>, TaskRunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            RunnerBehavior::Succeed => Ok(vec![TaskResult::new(
                "output",
                "value",
                json!({ "task": ctx.task_id }),
            )]),
            RunnerBehavior::Fail(message) => Err(TaskRunnerError::Other(message.clone())),
            RunnerBehavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Shared log of executed node names, tagged with the enumeration item
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Operator type that appends `<node>` or `<node>@<item>` to a log.
/// With `fail` set it errors instead.
pub struct RecordingFactory {
    pub node_type: &'static str,
    pub log: ExecutionLog,
    pub fail: bool,
}

impl RecordingFactory {
    pub fn new(node_type: &'static str, log: &ExecutionLog) -> Arc<Self> {
        Arc::new(Self {
            node_type,
            log: Arc::clone(log),
            fail: false,
        })
    }

    pub fn failing(node_type: &'static str, log: &ExecutionLog) -> Arc<Self> {
        Arc::new(Self {
            node_type,
            log: Arc::clone(log),
            fail: true,
        })
    }
}

impl OperatorFactory for RecordingFactory {
    fn node_type(&self) -> &'static str {
        self.node_type
    }

    fn build(&self, _ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        Ok(Arc::new(RecordingOperator {
            log: Arc::clone(&self.log),
            fail: self.fail,
        }))
    }
}

struct RecordingOperator {
    log: ExecutionLog,
    fail: bool,
}

#[async_trait]
impl Operator for RecordingOperator {
    async fn execute(
        &self,
        _inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let entry = match &ctx.enumeration_item {
            Some(item) => format!("{}@{}", ctx.node_name, item.name),
            None => ctx.node_name.clone(),
        };
        self.log.lock().push(entry.clone());
        if self.fail {
            return Err(PipelineError::component(
                "detector",
                &ctx.node_name,
                "detector exploded".into(),
            ));
        }
        Ok(single_output("output", OperatorResult::Value(json!(entry))))
    }
}

pub fn new_log() -> ExecutionLog {
    Arc::new(Mutex::new(Vec::new()))
}
