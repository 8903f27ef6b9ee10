//! Tabular data and detection results passed between operators.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::plan::EnumerationItem;

/// Column-named rows of JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Append a row; missing trailing cells are filled with null
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    pub fn i64_value(&self, row: usize, column: &str) -> Option<i64> {
        self.value(row, column).and_then(Value::as_i64)
    }

    pub fn f64_value(&self, row: usize, column: &str) -> Option<f64> {
        self.value(row, column).and_then(Value::as_f64)
    }

    /// Row as a column-name keyed object
    pub fn row_object(&self, row: usize) -> Option<Map<String, Value>> {
        let values = self.rows.get(row)?;
        Some(
            self.columns
                .iter()
                .cloned()
                .zip(values.iter().cloned())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyLabel {
    pub name: String,
    pub source_node_name: String,
    pub source_post_processor: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub ignore: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    /// Epoch millis, inclusive
    pub start_time: i64,
    /// Epoch millis, exclusive
    pub end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumeration_item: Option<EnumerationItem>,
    #[serde(default)]
    pub labels: Vec<AnomalyLabel>,
}

impl Anomaly {
    pub fn new(start_time: i64, end_time: i64) -> Self {
        Self {
            start_time,
            end_time,
            current_value: None,
            expected_value: None,
            alert_id: None,
            metric: None,
            dataset: None,
            source: None,
            enumeration_item: None,
            labels: Vec::new(),
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.labels.iter().any(|l| l.ignore)
    }
}

/// Output of an anomaly detector node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub anomalies: Vec<Anomaly>,
    /// Detector time series (timestamp, value, bounds, anomaly flag)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<DataTable>,
}
