//! Typed task payloads.
//!
//! A task's `payload` column holds a JSON document whose shape depends on the
//! task's type. Decoding happens once, at execution time, into the closed
//! [`TaskInfo`] enum.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::TaskType;
use crate::pipeline::plan::Plan;

#[derive(Debug, Error)]
pub enum TaskInfoError {
    #[error("Failed to decode {task_type} payload: {error}")]
    InvalidPayload { task_type: TaskType, error: String },

    #[error("Failed to encode {task_type} payload: {error}")]
    Encode { task_type: TaskType, error: String },
}

/// Payload of a DETECTION task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionTaskInfo {
    pub alert_id: i64,
    /// Detection window start, epoch millis
    pub start: i64,
    /// Detection window end, epoch millis (exclusive)
    pub end: i64,
    /// Inline plan; when absent the plan source resolves one by alert id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
}

/// Payload of a NOTIFICATION task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTaskInfo {
    pub subscription_group_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorType {
    /// Sweep orphaned RUNNING tasks
    Update,
    /// Purge old tasks
    Expire,
}

/// Payload of a MONITOR task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorTaskInfo {
    pub monitor_type: MonitorType,
    /// Retention in days for EXPIRE runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskInfo {
    Detection(DetectionTaskInfo),
    Notification(NotificationTaskInfo),
    Monitor(MonitorTaskInfo),
}

impl TaskInfo {
    /// Decode a payload according to the task's declared type
    pub fn from_payload(task_type: TaskType, payload: &str) -> Result<Self, TaskInfoError> {
        let invalid = |e: serde_json::Error| TaskInfoError::InvalidPayload {
            task_type,
            error: e.to_string(),
        };
        match task_type {
            TaskType::Detection => serde_json::from_str(payload)
                .map(TaskInfo::Detection)
                .map_err(invalid),
            TaskType::Notification => serde_json::from_str(payload)
                .map(TaskInfo::Notification)
                .map_err(invalid),
            TaskType::Monitor => serde_json::from_str(payload)
                .map(TaskInfo::Monitor)
                .map_err(invalid),
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            Self::Detection(_) => TaskType::Detection,
            Self::Notification(_) => TaskType::Notification,
            Self::Monitor(_) => TaskType::Monitor,
        }
    }

    pub fn to_payload(&self) -> Result<String, TaskInfoError> {
        let encoded = match self {
            Self::Detection(info) => serde_json::to_string(info),
            Self::Notification(info) => serde_json::to_string(info),
            Self::Monitor(info) => serde_json::to_string(info),
        };
        encoded.map_err(|e| TaskInfoError::Encode {
            task_type: self.task_type(),
            error: e.to_string(),
        })
    }
}
