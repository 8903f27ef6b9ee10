//! # Task Runners
//!
//! Type-specific execution logic behind the task runner registry:
//! [`PipelineTaskRunner`] for DETECTION tasks and [`MonitorTaskRunner`] for
//! MONITOR housekeeping.

pub mod monitor_task_runner;
pub mod pipeline_task_runner;
pub mod plan_source;

pub use monitor_task_runner::MonitorTaskRunner;
pub use pipeline_task_runner::PipelineTaskRunner;
pub use plan_source::{InMemoryPlanSource, InlinePlanSource, PlanSource};
