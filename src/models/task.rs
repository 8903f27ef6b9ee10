//! # Task Model
//!
//! A detection task is the unit of work leased by workers.
//!
//! ## Database Schema
//!
//! Maps to the `detection_tasks` table:
//! - `id`: Primary key (BIGSERIAL)
//! - `task_type`: DETECTION / NOTIFICATION / MONITOR
//! - `status`: WAITING / RUNNING / COMPLETED / FAILED / TIMEOUT
//! - `job_name`: `<TYPE>_<refId>`, e.g. `DETECTION_42`
//! - `payload`: serialized task info, polymorphic on `task_type`
//! - `worker_id`: worker currently or last holding the lease
//! - `version`: bumped on every lease; stale writers are rejected

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state_machine::TaskStatus;

/// Kind of work a task carries; selects both the payload shape and the runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    Detection,
    Notification,
    Monitor,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detection => "DETECTION",
            Self::Notification => "NOTIFICATION",
            Self::Monitor => "MONITOR",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DETECTION" => Ok(Self::Detection),
            "NOTIFICATION" => Ok(Self::Notification),
            "MONITOR" => Ok(Self::Monitor),
            _ => Err(format!("Invalid task type: {s}")),
        }
    }
}

/// A persisted task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub job_name: String,
    pub payload: String,
    pub worker_id: Option<i64>,
    pub version: i64,
    pub create_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_active_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl Task {
    pub fn is_owned_by(&self, worker_id: i64) -> bool {
        self.worker_id == Some(worker_id)
    }

    /// Time between creation and `acquired_at`, clamped at zero
    pub fn wait_time(&self, acquired_at: DateTime<Utc>) -> std::time::Duration {
        (acquired_at - self.create_time)
            .to_std()
            .unwrap_or_default()
    }
}

/// New task for creation (without generated fields)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub task_type: TaskType,
    pub job_name: String,
    pub payload: String,
}

impl NewTask {
    /// Build a task for the entity `ref_id`; the job name is `<TYPE>_<refId>`
    pub fn new(task_type: TaskType, ref_id: i64, payload: impl Into<String>) -> Self {
        Self {
            task_type,
            job_name: job_name(task_type, ref_id),
            payload: payload.into(),
        }
    }
}

pub fn job_name(task_type: TaskType, ref_id: i64) -> String {
    format!("{task_type}_{ref_id}")
}
