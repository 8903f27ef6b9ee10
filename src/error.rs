use std::error::Error as StdError;
use std::fmt::Write as _;

use thiserror::Error;

use crate::config::error::ConfigurationError;
use crate::database::task_store::StoreError;
use crate::execution::worker_pool::PoolError;
use crate::pipeline::errors::PipelineError;
use crate::registry::task_runner_registry::TaskRunnerError;

/// Top-level error for the detection engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Task runner error: {0}")]
    Runner(#[from] TaskRunnerError),

    #[error("Worker identity error: {0}")]
    WorkerIdentity(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Render an error together with its `source()` chain.
///
/// The first line is the error itself, each cause follows on its own
/// `Caused by:` line. This is what gets persisted as a FAILED task's message.
pub fn error_report(error: &(dyn StdError + 'static)) -> String {
    let mut report = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(report, "\nCaused by: {cause}");
        source = cause.source();
    }
    report
}
