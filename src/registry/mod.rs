//! # Registry Infrastructure
//!
//! Dispatch from a task's declared type to the runner that executes it.
//! Pipeline node types have their own registry in
//! [`crate::pipeline::NodeRegistry`].

pub mod task_runner_registry;

pub use task_runner_registry::{TaskContext, TaskRunner, TaskRunnerError, TaskRunnerRegistry};
