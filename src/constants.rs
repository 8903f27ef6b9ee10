//! # System Constants
//!
//! Core constants that define the operational boundaries of the detection
//! engine: status groups used by the lease protocol, default output keys of
//! the builtin operators, and housekeeping limits.

use crate::state_machine::TaskStatus;

/// Status groups consulted by the lease protocol.
pub mod status_groups {
    use super::TaskStatus;

    /// Statuses a worker may acquire a task from.
    pub const ACQUIRABLE_STATUSES: &[TaskStatus] = &[TaskStatus::Waiting, TaskStatus::Failed];
}

/// Default output keys and well-known param names of the builtin operators.
pub mod operator_keys {
    /// Output key used by nodes that do not declare a more specific one.
    pub const DEFAULT_OUTPUT_KEY: &str = "output";
    pub const DATA_FETCHER_OUTPUT_KEY: &str = "currentData";
    pub const ANOMALY_DETECTOR_OUTPUT_KEY: &str = "output_AnomalyDetectorResult";
    pub const ENUMERATOR_OUTPUT_KEY: &str = "enumeration";
    pub const COMBINER_OUTPUT_KEY: &str = "output_CombinerResult";
    pub const EVENT_FETCHER_OUTPUT_KEY: &str = "events";
    pub const SQL_EXECUTION_OUTPUT_KEY: &str = "sqlResult";

    pub const PROP_TYPE: &str = "type";
    pub const PROP_COMPONENT_PREFIX: &str = "component.";
    pub const PROP_ENUMERATOR: &str = "enumerator";
    pub const PROP_ROOT: &str = "root";
    pub const PROP_COMBINER: &str = "combiner";

    /// Default name of the node whose outputs a plan reports.
    pub const DEFAULT_PLAN_OUTPUT_NODE: &str = "root";
}

/// Housekeeping limits for the monitor runner.
pub mod housekeeping {
    /// Tasks older than this are purged by an EXPIRE monitor task.
    pub const DEFAULT_TASK_EXPIRE_DAYS: i64 = 60;

    /// Upper bound on rows deleted by a single purge run.
    pub const TASK_PURGE_LIMIT: i64 = 10_000;

    /// Message recorded on tasks swept by the orphan reaper.
    pub const ORPHAN_TASK_MESSAGE_PREFIX: &str = "Orphan Task. Worker id : ";
}

/// Message recorded on tasks this worker left RUNNING when it last stopped.
pub const LEFTOVER_TASK_MESSAGE: &str = "Worker restarted while task was running";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquirable_statuses_exclude_timeout() {
        assert!(!status_groups::ACQUIRABLE_STATUSES.contains(&TaskStatus::Timeout));
        assert!(status_groups::ACQUIRABLE_STATUSES.contains(&TaskStatus::Failed));
        assert!(status_groups::ACQUIRABLE_STATUSES.contains(&TaskStatus::Waiting));
    }
}
