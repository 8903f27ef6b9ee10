//! Runs a registered detector over the fetched table and turns flagged
//! points into anomalies.
//!
//! An anomaly starts at its flagged point and ends at the next point of the
//! series; the last point ends `monitoringGranularity` millis after its start
//! (inferred from the series spacing when the param is absent).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{is_template, optional_u64_param, require_str_param, table_input, validate_u64_param};
use crate::constants::operator_keys::{ANOMALY_DETECTOR_OUTPUT_KEY, DATA_FETCHER_OUTPUT_KEY, PROP_TYPE};
use crate::pipeline::components::{component_spec, detector_columns, AnomalyDetector};
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::data_table::{Anomaly, DataTable, DetectionResult};
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::{EnumerationItem, PlanNodeBean};

pub const MONITORING_GRANULARITY_PARAM: &str = "monitoringGranularity";
pub const ALERT_ID_PARAM: &str = "alertId";

pub struct AnomalyDetectorFactory;

impl OperatorFactory for AnomalyDetectorFactory {
    fn node_type(&self) -> &'static str {
        "AnomalyDetector"
    }

    fn default_output_key(&self) -> &'static str {
        ANOMALY_DETECTOR_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, app: &ApplicationContext) -> PipelineResult<()> {
        let detector_type = require_str_param(node, PROP_TYPE)?;
        if !is_template(&Value::from(detector_type)) && !app.detector_registry.contains(detector_type) {
            return Err(PipelineError::invalid_param(
                &node.name,
                PROP_TYPE,
                format!("unknown detector type '{detector_type}'"),
            ));
        }
        validate_u64_param(node, MONITORING_GRANULARITY_PARAM).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let node = &ctx.node;
        let detector_type = require_str_param(node, PROP_TYPE)?;
        let detector = ctx
            .app
            .detector_registry
            .build(detector_type, &component_spec(node))
            .ok_or_else(|| {
                PipelineError::invalid_param(
                    &node.name,
                    PROP_TYPE,
                    format!("unknown detector type '{detector_type}'"),
                )
            })?
            .map_err(|e| PipelineError::component("detector", detector_type, e))?;

        Ok(Arc::new(AnomalyDetectorOperator {
            detector_type: detector_type.to_string(),
            detector,
            monitoring_granularity: optional_u64_param(node, MONITORING_GRANULARITY_PARAM)?
                .map(|g| {
                    i64::try_from(g).map_err(|_| {
                        PipelineError::invalid_param(
                            &node.name,
                            MONITORING_GRANULARITY_PARAM,
                            "out of range",
                        )
                    })
                })
                .transpose()?,
            alert_id: node.param(ALERT_ID_PARAM).and_then(Value::as_i64),
            metric: node.str_param("metric").map(str::to_string),
            dataset: node.str_param("dataset").map(str::to_string),
            source: node.str_param("source").map(str::to_string),
        }))
    }
}

pub struct AnomalyDetectorOperator {
    detector_type: String,
    detector: Arc<dyn AnomalyDetector>,
    monitoring_granularity: Option<i64>,
    alert_id: Option<i64>,
    metric: Option<String>,
    dataset: Option<String>,
    source: Option<String>,
}

impl AnomalyDetectorOperator {
    fn build_anomalies(
        &self,
        series: &DataTable,
        enumeration_item: Option<&EnumerationItem>,
    ) -> Vec<Anomaly> {
        let timestamps: Vec<Option<i64>> = (0..series.row_count())
            .map(|row| series.i64_value(row, detector_columns::TIMESTAMP))
            .collect();
        let granularity = self.monitoring_granularity.unwrap_or_else(|| {
            match timestamps.as_slice() {
                [.., Some(previous), Some(last)] => last.saturating_sub(*previous),
                _ => 0,
            }
        });

        (0..series.row_count())
            .filter(|&row| {
                series
                    .value(row, detector_columns::IS_ANOMALY)
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
            })
            .filter_map(|row| {
                let start = timestamps[row]?;
                let end = timestamps
                    .get(row + 1)
                    .copied()
                    .flatten()
                    .unwrap_or(start.saturating_add(granularity));
                let mut anomaly = Anomaly::new(start, end);
                anomaly.current_value = series.f64_value(row, detector_columns::VALUE);
                anomaly.alert_id = self.alert_id;
                anomaly.metric = self.metric.clone();
                anomaly.dataset = self.dataset.clone();
                anomaly.source = self.source.clone();
                anomaly.enumeration_item = enumeration_item.cloned();
                Some(anomaly)
            })
            .collect()
    }
}

#[async_trait]
impl Operator for AnomalyDetectorOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let data = table_input(&ctx.node_name, inputs, DATA_FETCHER_OUTPUT_KEY)?;
        let series = self
            .detector
            .detect(data, ctx.detection_interval.as_ref())
            .map_err(|e| PipelineError::component("detector", &self.detector_type, e))?;

        let anomalies = self.build_anomalies(&series, ctx.enumeration_item.as_ref());
        debug!(
            node_name = %ctx.node_name,
            detector_type = %self.detector_type,
            anomaly_count = anomalies.len(),
            "Detection finished"
        );

        Ok(single_output(
            ANOMALY_DETECTOR_OUTPUT_KEY,
            OperatorResult::Detection(DetectionResult {
                anomalies,
                timeseries: Some(series),
            }),
        ))
    }
}
