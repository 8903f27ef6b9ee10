//! # Structured Logging Module
//!
//! Environment-aware structured logging for the worker process. Console output
//! is always installed; a JSON file layer is added when a log directory is
//! configured.

use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber, and
/// an already-installed global subscriber (e.g. from a test harness) is kept.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = resolve_log_level(config, &environment);

        let console_layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(&log_level))
                .boxed()
        };

        let mut guard = None;
        let mut log_path = None;
        let file_layer = config.log_dir.as_ref().and_then(|dir| {
            let log_dir = PathBuf::from(dir);
            if let Err(e) = std::fs::create_dir_all(&log_dir) {
                eprintln!("Failed to create log directory {}: {e}", log_dir.display());
                return None;
            }

            let file_name = format!(
                "{}.{}.{}.log",
                environment,
                process::id(),
                Utc::now().format("%Y%m%d_%H%M%S")
            );
            log_path = Some(log_dir.join(&file_name));

            let appender = tracing_appender::rolling::never(&log_dir, file_name);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);

            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(EnvFilter::new(&log_level)),
            )
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_level = %log_level,
            log_file = ?log_path,
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        guard
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("DETECTION_ENGINE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
        .to_lowercase()
}

fn resolve_log_level(config: &LoggingConfig, environment: &str) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.level.clone())
        .unwrap_or_else(|| get_log_level(environment))
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for task lifecycle operations
pub fn log_task_operation(
    operation: &str,
    task_id: i64,
    job_name: Option<&str>,
    worker_id: i64,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_id = task_id,
        job_name = job_name,
        worker_id = worker_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for pipeline node operations
pub fn log_node_operation(
    operation: &str,
    plan_name: &str,
    node_name: &str,
    node_type: &str,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::debug!(
        operation = %operation,
        plan_name = %plan_name,
        node_name = %node_name,
        node_type = %node_type,
        status = %status,
        duration_ms = duration_ms,
        "🔧 NODE_OPERATION"
    );
}
