use serde::{Deserialize, Serialize};

/// Summary of one output produced by a task run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Output key the result was published under
    pub key: String,
    /// Result kind, e.g. `detection` or `table`
    pub kind: String,
    pub summary: serde_json::Value,
}

impl TaskResult {
    pub fn new(key: impl Into<String>, kind: impl Into<String>, summary: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            kind: kind.into(),
            summary,
        }
    }
}
