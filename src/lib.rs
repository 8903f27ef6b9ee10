#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Detection Engine
//!
//! Task scheduling and pipeline execution core of an anomaly-detection
//! platform.
//!
//! ## Overview
//!
//! A fleet of worker processes leases tasks from a shared table under
//! optimistic concurrency, runs each one within a time budget while sending
//! heartbeats, and records the outcome. Detection tasks walk a DAG of typed
//! operators that can fan out into per-entity sub-pipelines and fan back in
//! through a combiner.
//!
//! ## Architecture
//!
//! ```text
//! TaskDriver ─┬─ TaskPoller (x max_parallel_tasks)
//!             │     └─ acquire ─ TaskExecutor ─ TaskRunnerRegistry
//!             │                                   ├─ PipelineTaskRunner ─ PipelineExecutor ─ operators
//!             │                                   └─ MonitorTaskRunner
//!             └─ WorkerPoolManager (executions, watchers, heartbeats)
//! ```
//!
//! ## Module Organization
//!
//! - [`execution`] - Lease protocol: worker identity, poll loops, heartbeats, timeouts
//! - [`database`] - Task store contract with Postgres and in-memory implementations
//! - [`pipeline`] - Plan compilation and operator DAG execution
//! - [`orchestration`] - Task runners for detection and monitor tasks
//! - [`registry`] - Task type to runner dispatch
//! - [`models`] - Task records and typed payloads
//! - [`state_machine`] - Task statuses and transition rules
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use detection_engine::config::ConfigManager;
//! use detection_engine::database::InMemoryTaskStore;
//! use detection_engine::execution::TaskDriver;
//! use detection_engine::models::TaskType;
//! use detection_engine::orchestration::PipelineTaskRunner;
//! use detection_engine::pipeline::PipelineExecutor;
//! use detection_engine::registry::TaskRunnerRegistry;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let runners = TaskRunnerRegistry::new();
//! runners.register(
//!     TaskType::Detection,
//!     Arc::new(PipelineTaskRunner::new(PipelineExecutor::with_defaults())),
//! );
//!
//! let driver = TaskDriver::new(config.config(), Arc::new(InMemoryTaskStore::new()), runners)?;
//! driver.start().await?;
//! driver.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod pipeline;
pub mod registry;
pub mod state_machine;

pub use config::{
    ConfigManager, DatabaseConfig, EngineConfig, LoggingConfig, PipelineConfig, TaskDriverConfig,
    WorkerConfig,
};
pub use constants::{housekeeping, operator_keys, status_groups};
pub use database::{InMemoryTaskStore, PgTaskStore, StoreError, TaskStore};
pub use error::{error_report, EngineError, Result};
pub use execution::{TaskDriver, TaskOutcome, WorkerIdentity, WorkerPoolManager};
pub use models::{NewTask, Task, TaskInfo, TaskResult, TaskType};
pub use pipeline::{PipelineError, PipelineExecutor, Plan};
pub use registry::{TaskRunner, TaskRunnerRegistry};
pub use state_machine::TaskStatus;
