//! Detector and post-processor components.
//!
//! Components are looked up by type tag in constructor registries and built
//! from the `component.*` params of their node (prefix stripped).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use super::data_table::{AnomalyLabel, DataTable, DetectionResult};
use super::errors::BoxError;
use super::plan::{DetectionInterval, PlanNodeBean};
use crate::constants::operator_keys::PROP_COMPONENT_PREFIX;

/// Columns of the time series every detector returns
pub mod detector_columns {
    pub const TIMESTAMP: &str = "timestamp";
    pub const VALUE: &str = "value";
    pub const LOWER_BOUND: &str = "lowerBound";
    pub const UPPER_BOUND: &str = "upperBound";
    pub const IS_ANOMALY: &str = "isAnomaly";

    pub fn all() -> Vec<String> {
        [TIMESTAMP, VALUE, LOWER_BOUND, UPPER_BOUND, IS_ANOMALY]
            .iter()
            .map(|c| c.to_string())
            .collect()
    }
}

/// Collect `component.*` params into a spec map
pub fn component_spec(node: &PlanNodeBean) -> Map<String, Value> {
    node.params
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(PROP_COMPONENT_PREFIX)
                .map(|k| (k.to_string(), value.clone()))
        })
        .collect()
}

pub trait AnomalyDetector: Send + Sync {
    /// Score `data` and return a time series with [`detector_columns`]
    fn detect(
        &self,
        data: &DataTable,
        interval: Option<&DetectionInterval>,
    ) -> Result<DataTable, BoxError>;
}

pub type DetectorConstructor =
    Arc<dyn Fn(&Map<String, Value>) -> Result<Arc<dyn AnomalyDetector>, BoxError> + Send + Sync>;

#[derive(Default)]
pub struct DetectorRegistry {
    constructors: HashMap<String, DetectorConstructor>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_detectors() -> Self {
        let mut registry = Self::new();
        registry.register("threshold", Arc::new(ThresholdDetector::from_spec));
        registry
    }

    pub fn register(&mut self, detector_type: &str, constructor: DetectorConstructor) {
        self.constructors
            .insert(detector_type.to_string(), constructor);
    }

    pub fn contains(&self, detector_type: &str) -> bool {
        self.constructors.contains_key(detector_type)
    }

    pub fn build(
        &self,
        detector_type: &str,
        spec: &Map<String, Value>,
    ) -> Option<Result<Arc<dyn AnomalyDetector>, BoxError>> {
        self.constructors
            .get(detector_type)
            .map(|constructor| constructor(spec))
    }

    pub fn detector_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Flags points outside `[min, max]`
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdDetector {
    pub timestamp_column: String,
    pub metric_column: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ThresholdDetector {
    pub fn from_spec(spec: &Map<String, Value>) -> Result<Arc<dyn AnomalyDetector>, BoxError> {
        let bound = |key: &str| -> Result<Option<f64>, BoxError> {
            match spec.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_f64()
                    .map(Some)
                    .ok_or_else(|| format!("threshold '{key}' must be a number, got {v}").into()),
            }
        };
        Ok(Arc::new(Self {
            timestamp_column: spec
                .get("timestamp")
                .and_then(Value::as_str)
                .unwrap_or("ts")
                .to_string(),
            metric_column: spec
                .get("metric")
                .and_then(Value::as_str)
                .unwrap_or("met")
                .to_string(),
            min: bound("min")?,
            max: bound("max")?,
        }))
    }
}

impl AnomalyDetector for ThresholdDetector {
    fn detect(
        &self,
        data: &DataTable,
        _interval: Option<&DetectionInterval>,
    ) -> Result<DataTable, BoxError> {
        let ts_index = data
            .column_index(&self.timestamp_column)
            .ok_or_else(|| format!("missing timestamp column '{}'", self.timestamp_column))?;
        let metric_index = data
            .column_index(&self.metric_column)
            .ok_or_else(|| format!("missing metric column '{}'", self.metric_column))?;

        let mut output = DataTable::new(detector_columns::all());
        for row in &data.rows {
            let timestamp = row
                .get(ts_index)
                .and_then(Value::as_i64)
                .ok_or("timestamp values must be integers")?;
            let value = row.get(metric_index).and_then(Value::as_f64);
            let is_anomaly = value.is_some_and(|v| {
                self.min.is_some_and(|min| v < min) || self.max.is_some_and(|max| v > max)
            });
            output.push_row(vec![
                json!(timestamp),
                json!(value),
                json!(self.min),
                json!(self.max),
                json!(is_anomaly),
            ]);
        }
        Ok(output)
    }
}

pub struct PostProcessorContext<'a> {
    pub node_name: &'a str,
    pub post_processor_type: &'a str,
}

pub trait AnomalyPostProcessor: Send + Sync {
    fn post_process(
        &self,
        result: DetectionResult,
        ctx: &PostProcessorContext<'_>,
    ) -> Result<DetectionResult, BoxError>;
}

pub type PostProcessorConstructor = Arc<
    dyn Fn(&Map<String, Value>) -> Result<Arc<dyn AnomalyPostProcessor>, BoxError> + Send + Sync,
>;

#[derive(Default)]
pub struct PostProcessorRegistry {
    constructors: HashMap<String, PostProcessorConstructor>,
}

impl PostProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_post_processors() -> Self {
        let mut registry = Self::new();
        registry.register("label", Arc::new(LabelPostProcessor::from_spec));
        registry
    }

    pub fn register(&mut self, post_processor_type: &str, constructor: PostProcessorConstructor) {
        self.constructors
            .insert(post_processor_type.to_string(), constructor);
    }

    pub fn contains(&self, post_processor_type: &str) -> bool {
        self.constructors.contains_key(post_processor_type)
    }

    pub fn build(
        &self,
        post_processor_type: &str,
        spec: &Map<String, Value>,
    ) -> Option<Result<Arc<dyn AnomalyPostProcessor>, BoxError>> {
        self.constructors
            .get(post_processor_type)
            .map(|constructor| constructor(spec))
    }

    pub fn post_processor_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.constructors.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Attaches a named label to anomalies whose current value falls in `[minValue, maxValue]`
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPostProcessor {
    pub label_name: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub ignore: bool,
}

impl LabelPostProcessor {
    pub fn from_spec(spec: &Map<String, Value>) -> Result<Arc<dyn AnomalyPostProcessor>, BoxError> {
        let label_name = spec
            .get("labelName")
            .and_then(Value::as_str)
            .ok_or("label post-processor requires 'labelName'")?
            .to_string();
        Ok(Arc::new(Self {
            label_name,
            min_value: spec.get("minValue").and_then(Value::as_f64),
            max_value: spec.get("maxValue").and_then(Value::as_f64),
            ignore: spec.get("ignore").and_then(Value::as_bool).unwrap_or(false),
        }))
    }

    fn applies_to(&self, value: Option<f64>) -> bool {
        match value {
            Some(v) => {
                self.min_value.map_or(true, |min| v >= min)
                    && self.max_value.map_or(true, |max| v <= max)
            }
            None => self.min_value.is_none() && self.max_value.is_none(),
        }
    }
}

impl AnomalyPostProcessor for LabelPostProcessor {
    fn post_process(
        &self,
        mut result: DetectionResult,
        ctx: &PostProcessorContext<'_>,
    ) -> Result<DetectionResult, BoxError> {
        for anomaly in result
            .anomalies
            .iter_mut()
            .filter(|a| self.applies_to(a.current_value))
        {
            let mut metadata = Map::new();
            if let Some(min) = self.min_value {
                metadata.insert("minValue".to_string(), json!(min));
            }
            if let Some(max) = self.max_value {
                metadata.insert("maxValue".to_string(), json!(max));
            }
            anomaly.labels.push(AnomalyLabel {
                name: self.label_name.clone(),
                source_node_name: ctx.node_name.to_string(),
                source_post_processor: ctx.post_processor_type.to_string(),
                metadata,
                ignore: self.ignore,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::data_table::Anomaly;

    fn spec(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_component_spec_strips_prefix() {
        let node = PlanNodeBean::new("d", "AnomalyDetector")
            .with_param("type", "threshold")
            .with_param("component.max", 5);
        let spec = component_spec(&node);
        assert_eq!(spec.len(), 1);
        assert_eq!(spec["max"], json!(5));
    }

    #[test]
    fn test_threshold_detector_flags_out_of_range_points() {
        let detector =
            ThresholdDetector::from_spec(&spec(json!({"min": 1.0, "max": 10.0}))).unwrap();
        let data = DataTable::with_rows(
            vec!["ts".into(), "met".into()],
            vec![
                vec![json!(0), json!(5.0)],
                vec![json!(1), json!(11.0)],
                vec![json!(2), json!(0.5)],
                vec![json!(3), Value::Null],
            ],
        );

        let series = detector.detect(&data, None).unwrap();
        let flags: Vec<bool> = (0..series.row_count())
            .map(|row| {
                series
                    .value(row, detector_columns::IS_ANOMALY)
                    .and_then(Value::as_bool)
                    .unwrap()
            })
            .collect();
        assert_eq!(flags, vec![false, true, true, false]);
    }

    #[test]
    fn test_threshold_detector_requires_columns() {
        let detector = ThresholdDetector::from_spec(&Map::new()).unwrap();
        let data = DataTable::new(vec!["time".into()]);
        assert!(detector.detect(&data, None).is_err());
    }

    #[test]
    fn test_label_post_processor_respects_bounds() {
        let processor = LabelPostProcessor::from_spec(&spec(
            json!({"labelName": "small", "maxValue": 10.0, "ignore": true}),
        ))
        .unwrap();
        let mut small = Anomaly::new(0, 1);
        small.current_value = Some(3.0);
        let mut large = Anomaly::new(1, 2);
        large.current_value = Some(30.0);

        let result = processor
            .post_process(
                DetectionResult {
                    anomalies: vec![small, large],
                    timeseries: None,
                },
                &PostProcessorContext {
                    node_name: "pp",
                    post_processor_type: "label",
                },
            )
            .unwrap();

        assert_eq!(result.anomalies[0].labels.len(), 1);
        assert_eq!(result.anomalies[0].labels[0].source_node_name, "pp");
        assert!(result.anomalies[0].is_ignored());
        assert!(result.anomalies[1].labels.is_empty());
    }

    #[test]
    fn test_label_requires_name() {
        assert!(LabelPostProcessor::from_spec(&Map::new()).is_err());
    }
}
