//! # Detection Engine Configuration System
//!
//! YAML-based configuration for the worker process. A single
//! `detection-engine.yaml` holds the base settings plus optional
//! `development` / `test` / `production` sections that are deep-merged over
//! the base for the active environment.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use detection_engine::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//!
//! let parallelism = manager.config().task_driver.max_parallel_tasks;
//! let backoff = manager.config().task_driver.no_task_delay();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::ConfigurationError;
pub use loader::ConfigManager;

/// Root configuration structure mirroring `detection-engine.yaml`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker: WorkerConfig,
    pub task_driver: TaskDriverConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    /// Active environment, filled in by the loader
    #[serde(skip_deserializing)]
    pub environment: String,
}

/// Worker process identity
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// When false the worker binary exits without polling
    pub enabled: bool,
    /// Generate a fresh random worker id on every start. Mutually exclusive with `id`.
    pub random_worker_id_enabled: bool,
    /// Fixed, non-negative worker id
    pub id: Option<i64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            random_worker_id_enabled: true,
            id: None,
        }
    }
}

/// Lease protocol timings and limits
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskDriverConfig {
    pub max_parallel_tasks: usize,
    pub task_fetch_size_cap: i64,
    pub no_task_delay_ms: u64,
    pub task_failure_delay_ms: u64,
    pub random_delay_cap_ms: u64,
    pub max_task_run_time_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub active_threshold_multiplier: u32,
}

impl Default for TaskDriverConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 5,
            task_fetch_size_cap: 50,
            no_task_delay_ms: 15_000,       // 15s
            task_failure_delay_ms: 30_000,  // 30s
            random_delay_cap_ms: 15_000,    // 15s
            max_task_run_time_ms: 21_600_000, // 6h
            heartbeat_interval_ms: 30_000,  // 30s
            active_threshold_multiplier: 3,
        }
    }
}

impl TaskDriverConfig {
    pub fn no_task_delay(&self) -> Duration {
        Duration::from_millis(self.no_task_delay_ms)
    }

    pub fn task_failure_delay(&self) -> Duration {
        Duration::from_millis(self.task_failure_delay_ms)
    }

    pub fn random_delay_cap(&self) -> Duration {
        Duration::from_millis(self.random_delay_cap_ms)
    }

    pub fn max_task_run_time(&self) -> Duration {
        Duration::from_millis(self.max_task_run_time_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// A RUNNING task whose last heartbeat is older than this is considered
    /// abandoned. `None` when the product does not fit in a `Duration`.
    pub fn active_threshold(&self) -> Option<Duration> {
        self.heartbeat_interval()
            .checked_mul(self.active_threshold_multiplier)
    }
}

/// Postgres connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; `${VAR}` is expanded from the environment
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub pool: u32,
    pub connect_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "detection_engine_development".to_string(),
            pool: 10,
            connect_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    /// Build complete database URL from configuration
    pub fn database_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Operator DAG execution settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of fork-join items evaluated concurrently
    pub fork_join_parallelism: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fork_join_parallelism: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; `RUST_LOG` still takes precedence
    pub level: Option<String>,
    /// Emit console logs as JSON
    pub json: bool,
    /// Directory for JSON log files; no file output when unset
    pub log_dir: Option<String>,
}

impl EngineConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match (self.worker.random_worker_id_enabled, self.worker.id) {
            (true, Some(id)) => {
                return Err(ConfigurationError::invalid_value(
                    "worker.id",
                    id.to_string(),
                    "a fixed worker id cannot be combined with random_worker_id_enabled",
                ));
            }
            (false, None) => {
                return Err(ConfigurationError::validation_error(
                    "either worker.id or worker.random_worker_id_enabled must be set",
                ));
            }
            (false, Some(id)) if id < 0 => {
                return Err(ConfigurationError::invalid_value(
                    "worker.id",
                    id.to_string(),
                    "worker id must be non-negative",
                ));
            }
            _ => {}
        }

        if self.task_driver.max_parallel_tasks == 0 {
            return Err(ConfigurationError::invalid_value(
                "task_driver.max_parallel_tasks",
                "0",
                "at least one task must be allowed to run",
            ));
        }

        if self.task_driver.task_fetch_size_cap <= 0 {
            return Err(ConfigurationError::invalid_value(
                "task_driver.task_fetch_size_cap",
                self.task_driver.task_fetch_size_cap.to_string(),
                "fetch size must be greater than 0",
            ));
        }

        if self.task_driver.active_threshold_multiplier == 0 {
            return Err(ConfigurationError::invalid_value(
                "task_driver.active_threshold_multiplier",
                "0",
                "multiplier must be greater than 0",
            ));
        }

        if self.task_driver.active_threshold().is_none() {
            return Err(ConfigurationError::invalid_value(
                "task_driver.active_threshold_multiplier",
                self.task_driver.active_threshold_multiplier.to_string(),
                "heartbeat_interval_ms times the multiplier overflows",
            ));
        }

        if self.pipeline.fork_join_parallelism == 0 {
            return Err(ConfigurationError::invalid_value(
                "pipeline.fork_join_parallelism",
                "0",
                "parallelism must be greater than 0",
            ));
        }

        if self.database.pool == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.pool",
                "0",
                "pool size must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn database_url(&self) -> String {
        self.database.database_url()
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "test"
    }

    pub fn is_production_environment(&self) -> bool {
        self.environment == "production"
    }
}
