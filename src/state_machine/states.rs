use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a detection task as persisted in the task store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created by a producer, not yet leased
    Waiting,
    /// Leased by exactly one worker
    Running,
    /// Finished successfully
    Completed,
    /// Execution raised an error, or the owning worker disappeared
    Failed,
    /// Execution exceeded the maximum run time
    Timeout,
}

impl TaskStatus {
    /// Check if this is a terminal status (no further transitions by the owning worker)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }

    /// Check if this is an active status (task is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// A worker may lease a task in this status. FAILED tasks are retried,
    /// TIMEOUT tasks are not.
    pub fn is_acquirable(&self) -> bool {
        matches!(self, Self::Waiting | Self::Failed)
    }

    /// Guard for the transitions the lease protocol performs. RUNNING may
    /// go back to WAITING when a lease is handed back unexecuted.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (from, Self::Running) => from.is_acquirable(),
            (Self::Running, Self::Waiting) => true,
            (Self::Running, to) => to.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(Self::Waiting),
            "RUNNING" => Ok(Self::Running),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "TIMEOUT" => Ok(Self::Timeout),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Default status for new tasks
impl Default for TaskStatus {
    fn default() -> Self {
        Self::Waiting
    }
}
