//! Plan description format.
//!
//! ```json
//! {
//!   "name": "revenue-alert",
//!   "outputNode": "root",
//!   "detectionInterval": { "start": 1700000000000, "end": 1700086400000 },
//!   "nodes": [
//!     { "name": "fetch", "type": "DataFetcher", "params": { "component.dataSource": "pg" } },
//!     { "name": "root", "type": "AnomalyDetector",
//!       "params": { "type": "threshold", "component.max": 100 },
//!       "inputs": [ { "sourcePlanNode": "fetch" } ] }
//!   ]
//! }
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::operator_keys::DEFAULT_PLAN_OUTPUT_NODE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_interval: Option<DetectionInterval>,
    pub nodes: Vec<PlanNodeBean>,
}

impl Plan {
    pub fn output_node_name(&self) -> &str {
        self.output_node
            .as_deref()
            .unwrap_or(DEFAULT_PLAN_OUTPUT_NODE)
    }

    pub fn node(&self, name: &str) -> Option<&PlanNodeBean> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Half-open detection window in epoch millis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionInterval {
    pub start: i64,
    pub end: i64,
}

impl DetectionInterval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start).single()
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.end).single()
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNodeBean {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<PlanNodeInput>,
}

impl PlanNodeBean {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            params: Map::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_input(mut self, input: PlanNodeInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNodeInput {
    pub source_plan_node: String,
    /// Output key read from the source; defaults to the source type's default output key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_property: Option<String>,
    /// Key the value is bound under for the consumer; defaults to the source property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_property: Option<String>,
}

impl PlanNodeInput {
    pub fn from_node(source_plan_node: impl Into<String>) -> Self {
        Self {
            source_plan_node: source_plan_node.into(),
            source_property: None,
            target_property: None,
        }
    }

    pub fn with_source_property(mut self, property: impl Into<String>) -> Self {
        self.source_property = Some(property.into());
        self
    }

    pub fn with_target_property(mut self, property: impl Into<String>) -> Self {
        self.target_property = Some(property.into());
        self
    }
}

/// One entity produced by an enumerator; its params feed `${...}` templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumerationItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}
