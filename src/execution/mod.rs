//! # Task Execution
//!
//! The lease protocol between worker processes and the task store: worker
//! identity, poll loops, bounded execution with heartbeats and timeouts,
//! and crash recovery.

pub mod heartbeat;
pub mod metrics;
pub mod task_driver;
pub mod task_executor;
pub mod task_poller;
pub mod worker_identity;
pub mod worker_pool;

pub use heartbeat::{start_heartbeat, HeartbeatGuard};
pub use metrics::{TaskDriverMetrics, TaskDriverMetricsSnapshot};
pub use task_driver::TaskDriver;
pub use task_executor::{TaskExecutor, TaskOutcome};
pub use task_poller::{acquire_next_task_to_run, TaskPoller};
pub use worker_identity::WorkerIdentity;
pub use worker_pool::{PoolError, WorkerPoolManager};
