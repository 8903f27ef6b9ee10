//! # Task Persistence
//!
//! The task store contract plus its two implementations.
//!
//! ## Key Components
//!
//! - [`task_store`] - the [`TaskStore`] trait and [`StoreError`]
//! - [`pg_task_store`] - Postgres implementation via `sqlx`
//! - [`in_memory_task_store`] - mutex-guarded implementation for tests and embedding
//! - [`connection`] - pool construction and migrations
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use detection_engine::config::DatabaseConfig;
//! use detection_engine::database::{DatabaseConnection, PgTaskStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! db.migrate().await?;
//! let store = PgTaskStore::new(db.pool().clone());
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod in_memory_task_store;
pub mod pg_task_store;
pub mod task_store;

pub use connection::DatabaseConnection;
pub use in_memory_task_store::InMemoryTaskStore;
pub use pg_task_store::PgTaskStore;
pub use task_store::{StoreError, StoreResult, TaskStore};
