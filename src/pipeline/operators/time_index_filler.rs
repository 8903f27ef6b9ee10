//! Completes a time series so that every bucket of the detection interval
//! has a row. Missing buckets get a row whose other cells are null.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{is_template, optional_str_param, optional_u64_param, table_input};
use crate::constants::operator_keys::DATA_FETCHER_OUTPUT_KEY;
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::data_table::DataTable;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::{DetectionInterval, PlanNodeBean};

pub const TIME_COLUMN_PARAM: &str = "timeColumn";
pub const GRANULARITY_PARAM: &str = "granularityMillis";

fn granularity(node: &PlanNodeBean) -> PipelineResult<i64> {
    match optional_u64_param(node, GRANULARITY_PARAM)? {
        None => Err(PipelineError::missing_param(&node.name, GRANULARITY_PARAM)),
        Some(0) => Err(PipelineError::invalid_param(
            &node.name,
            GRANULARITY_PARAM,
            "must be greater than 0",
        )),
        Some(g) => i64::try_from(g).map_err(|_| {
            PipelineError::invalid_param(&node.name, GRANULARITY_PARAM, "out of range")
        }),
    }
}

pub struct TimeIndexFillerFactory;

impl OperatorFactory for TimeIndexFillerFactory {
    fn node_type(&self) -> &'static str {
        "TimeIndexFiller"
    }

    fn default_output_key(&self) -> &'static str {
        DATA_FETCHER_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, _app: &ApplicationContext) -> PipelineResult<()> {
        optional_str_param(node, TIME_COLUMN_PARAM, "ts")?;
        if node.param(GRANULARITY_PARAM).is_some_and(is_template) {
            return Ok(());
        }
        granularity(node).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        Ok(Arc::new(TimeIndexFillerOperator {
            time_column: optional_str_param(&ctx.node, TIME_COLUMN_PARAM, "ts")?.to_string(),
            granularity: granularity(&ctx.node)?,
        }))
    }
}

pub struct TimeIndexFillerOperator {
    time_column: String,
    granularity: i64,
}

impl TimeIndexFillerOperator {
    /// Bucket range is the interval when given, else the data's min..=max
    fn fill(
        &self,
        node_name: &str,
        table: &DataTable,
        interval: Option<&DetectionInterval>,
    ) -> PipelineResult<DataTable> {
        let ts_index = table.column_index(&self.time_column).ok_or_else(|| {
            PipelineError::invalid_input(node_name, &self.time_column, "time column not found")
        })?;

        let mut by_time: BTreeMap<i64, Vec<Value>> = BTreeMap::new();
        for row in &table.rows {
            let ts = row.get(ts_index).and_then(Value::as_i64).ok_or_else(|| {
                PipelineError::invalid_input(
                    node_name,
                    &self.time_column,
                    "timestamps must be integers",
                )
            })?;
            by_time.insert(ts, row.clone());
        }

        let (start, end) = match interval {
            Some(interval) => (interval.start, interval.end),
            None => match (by_time.keys().next(), by_time.keys().next_back()) {
                (Some(&first), Some(&last)) => (first, last.saturating_add(1)),
                _ => return Ok(table.clone()),
            },
        };

        let mut filled = DataTable::new(table.columns.clone());
        let mut bucket = start;
        while bucket < end {
            match by_time.get(&bucket) {
                Some(row) => filled.push_row(row.clone()),
                None => {
                    let mut row = vec![Value::Null; table.columns.len()];
                    row[ts_index] = json!(bucket);
                    filled.push_row(row);
                }
            }
            match bucket.checked_add(self.granularity) {
                Some(next) => bucket = next,
                None => break,
            }
        }
        Ok(filled)
    }
}

#[async_trait]
impl Operator for TimeIndexFillerOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let table = table_input(&ctx.node_name, inputs, DATA_FETCHER_OUTPUT_KEY)?;
        let filled = self.fill(&ctx.node_name, table, ctx.detection_interval.as_ref())?;
        Ok(single_output(DATA_FETCHER_OUTPUT_KEY, OperatorResult::Table(filled)))
    }
}
