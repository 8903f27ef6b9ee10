//! # Detection Worker
//!
//! Runs the task driver against the Postgres task table until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::info;

use detection_engine::config::ConfigManager;
use detection_engine::database::{DatabaseConnection, PgTaskStore};
use detection_engine::execution::TaskDriver;
use detection_engine::logging::init_structured_logging;
use detection_engine::models::TaskType;
use detection_engine::orchestration::{MonitorTaskRunner, PipelineTaskRunner};
use detection_engine::pipeline::{ApplicationContext, NodeRegistry, PipelineExecutor};
use detection_engine::registry::TaskRunnerRegistry;
use detection_engine::TaskStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let manager = ConfigManager::load().context("failed to load configuration")?;
    let config = manager.config();
    init_structured_logging(&config.logging);
    info!(environment = %manager.environment(), "Starting detection worker");

    if !config.worker.enabled {
        info!("Worker disabled by configuration, exiting");
        return Ok(());
    }

    let connection = DatabaseConnection::connect(&config.database)
        .await
        .context("failed to connect to the task database")?;
    connection
        .migrate()
        .await
        .context("failed to run database migrations")?;
    let store: Arc<dyn TaskStore> = Arc::new(PgTaskStore::new(connection.pool().clone()));

    let executor = PipelineExecutor::new(
        Arc::new(NodeRegistry::with_builtin_operators()),
        Arc::new(ApplicationContext::new()),
        config.pipeline.clone(),
    );
    let runners = TaskRunnerRegistry::new();
    runners.register(
        TaskType::Detection,
        Arc::new(PipelineTaskRunner::new(executor)),
    );
    runners.register(
        TaskType::Monitor,
        Arc::new(MonitorTaskRunner::new(
            Arc::clone(&store),
            config.task_driver.clone(),
        )),
    );

    let driver = TaskDriver::new(config, store, runners)?;
    driver.start().await?;
    info!(worker_id = driver.worker_id(), "Detection worker running");

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    driver.shutdown().await;
    info!(metrics = ?driver.metrics(), "Task driver stopped");
    connection.close().await;
    Ok(())
}
