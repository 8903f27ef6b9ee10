//! # Operator Contract
//!
//! An operator is one executable node of a compiled plan. It receives the
//! outputs of its upstream nodes, bound under the keys declared by the plan,
//! and returns its own named outputs.
//!
//! Outputs are shared read-only: every value is wrapped in an `Arc` so one
//! result can feed many consumers without copying.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use super::dag::CompiledPlan;
use super::data_table::{Anomaly, DataTable, DetectionResult};
use super::errors::PipelineResult;
use super::executor::PipelineExecutor;
use super::plan::{DetectionInterval, EnumerationItem};

pub type OperatorOutputs = BTreeMap<String, Arc<OperatorResult>>;

/// Value produced by an operator under one output key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OperatorResult {
    Table(DataTable),
    Detection(DetectionResult),
    Enumeration(Vec<EnumerationItem>),
    /// Ordered per-item outputs of a fork-join, as handed to its combiner
    ForkJoin(Vec<ForkJoinItemResult>),
    Combined(CombinerResult),
    Value(serde_json::Value),
}

impl OperatorResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Detection(_) => "detection",
            Self::Enumeration(_) => "enumeration",
            Self::ForkJoin(_) => "fork_join",
            Self::Combined(_) => "combined",
            Self::Value(_) => "value",
        }
    }

    /// Compact description used for task results and logs
    pub fn summary(&self) -> serde_json::Value {
        match self {
            Self::Table(table) => json!({"rows": table.row_count(), "columns": table.columns}),
            Self::Detection(result) => json!({
                "anomalies": result.anomalies.len(),
                "ignored": result.anomalies.iter().filter(|a| a.is_ignored()).count(),
            }),
            Self::Enumeration(items) => json!({"items": items.len()}),
            Self::ForkJoin(items) => json!({"items": items.len()}),
            Self::Combined(combined) => json!({
                "items": combined.items.len(),
                "anomalies": combined.anomalies().len(),
            }),
            Self::Value(value) => value.clone(),
        }
    }

    pub fn as_table(&self) -> Option<&DataTable> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_detection(&self) -> Option<&DetectionResult> {
        match self {
            Self::Detection(result) => Some(result),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<&[EnumerationItem]> {
        match self {
            Self::Enumeration(items) => Some(items),
            _ => None,
        }
    }
}

/// Outputs of one per-item run of a fork-join root
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForkJoinItemResult {
    pub item: EnumerationItem,
    pub outputs: OperatorOutputs,
}

/// Merged fork-join outputs in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CombinerResult {
    pub items: Vec<ForkJoinItemResult>,
}

impl CombinerResult {
    /// Every anomaly across all items, tagged with the item that produced it
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.items
            .iter()
            .flat_map(|item_result| {
                item_result
                    .outputs
                    .values()
                    .filter_map(|output| output.as_detection())
                    .flat_map(|detection| detection.anomalies.iter().cloned())
                    .map(|mut anomaly| {
                        if anomaly.enumeration_item.is_none() {
                            anomaly.enumeration_item = Some(item_result.item.clone());
                        }
                        anomaly
                    })
            })
            .collect()
    }
}

/// Runtime context handed to every operator invocation
#[derive(Clone)]
pub struct ExecutionContext {
    pub plan: Arc<CompiledPlan>,
    pub executor: PipelineExecutor,
    pub node_name: String,
    pub detection_interval: Option<DetectionInterval>,
    /// Set while running inside a fork-join item
    pub enumeration_item: Option<EnumerationItem>,
}

#[async_trait]
pub trait Operator: Send + Sync {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs>;
}

/// Build an output map with a single entry
pub fn single_output(key: &str, result: OperatorResult) -> OperatorOutputs {
    let mut outputs = OperatorOutputs::new();
    outputs.insert(key.to_string(), Arc::new(result));
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combiner_tags_anomalies_with_item() {
        let item = EnumerationItem {
            id: Some(1),
            name: "us".into(),
            params: Default::default(),
        };
        let detection = DetectionResult {
            anomalies: vec![Anomaly::new(0, 10), Anomaly::new(10, 20)],
            timeseries: None,
        };
        let combined = CombinerResult {
            items: vec![ForkJoinItemResult {
                item: item.clone(),
                outputs: single_output("out", OperatorResult::Detection(detection)),
            }],
        };

        let anomalies = combined.anomalies();
        assert_eq!(anomalies.len(), 2);
        assert!(anomalies
            .iter()
            .all(|a| a.enumeration_item.as_ref() == Some(&item)));
    }

    #[test]
    fn test_summary_counts() {
        let table = DataTable::with_rows(vec!["a".into()], vec![vec![json!(1)], vec![json!(2)]]);
        assert_eq!(OperatorResult::Table(table).summary()["rows"], json!(2));
    }
}
