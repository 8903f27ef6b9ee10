//! # Task Runner Registry
//!
//! Maps a task's declared [`TaskType`] to the runner that executes it.
//!
//! Runners are registered once at bootstrap and looked up for every leased
//! task. A task whose type has no runner is failed immediately by the
//! executor.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use detection_engine::models::TaskType;
//! use detection_engine::orchestration::PipelineTaskRunner;
//! use detection_engine::pipeline::PipelineExecutor;
//! use detection_engine::registry::TaskRunnerRegistry;
//!
//! let registry = TaskRunnerRegistry::new();
//! registry.register(
//!     TaskType::Detection,
//!     Arc::new(PipelineTaskRunner::new(PipelineExecutor::with_defaults())),
//! );
//! assert!(registry.get(TaskType::Detection).is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::database::task_store::StoreError;
use crate::models::{TaskInfo, TaskResult, TaskType};
use crate::pipeline::errors::PipelineError;

#[derive(Debug, Error)]
pub enum TaskRunnerError {
    #[error("Pipeline execution failed")]
    Pipeline(#[from] PipelineError),

    #[error("Task store operation failed")]
    Store(#[from] StoreError),

    #[error("{runner} cannot run {task_type} tasks")]
    UnsupportedTaskInfo {
        runner: &'static str,
        task_type: TaskType,
    },

    #[error("Plan unavailable: {0}")]
    PlanUnavailable(String),

    #[error("{0}")]
    Other(String),
}

/// What a runner gets to know about the task it is executing
#[derive(Debug, Clone, PartialEq)]
pub struct TaskContext {
    pub task_id: i64,
    pub job_name: String,
    pub worker_id: i64,
}

#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn execute(
        &self,
        info: TaskInfo,
        ctx: &TaskContext,
    ) -> Result<Vec<TaskResult>, TaskRunnerError>;
}

#[derive(Default, Clone)]
pub struct TaskRunnerRegistry {
    runners: Arc<RwLock<HashMap<TaskType, Arc<dyn TaskRunner>>>>,
}

impl TaskRunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a runner, replacing any previous runner for the type
    pub fn register(&self, task_type: TaskType, runner: Arc<dyn TaskRunner>) {
        let replaced = self.runners.write().insert(task_type, runner).is_some();
        info!(task_type = %task_type, replaced = replaced, "Registered task runner");
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskRunner>> {
        self.runners.read().get(&task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<_> = self.runners.read().keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl std::fmt::Debug for TaskRunnerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunnerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}
