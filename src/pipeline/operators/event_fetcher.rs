use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::constants::operator_keys::EVENT_FETCHER_OUTPUT_KEY;
use crate::pipeline::context::{ApplicationContext, EventQuery, EventStore};
use crate::pipeline::data_table::DataTable;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::PlanNodeBean;

pub const EVENT_TYPES_PARAM: &str = "eventTypes";

pub fn event_columns() -> Vec<String> {
    ["name", "type", "startTime", "endTime"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn event_types(node: &PlanNodeBean) -> PipelineResult<Vec<String>> {
    match node.param(EVENT_TYPES_PARAM) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(single)) => Ok(vec![single.clone()]),
        Some(Value::Array(types)) => types
            .iter()
            .map(|t| {
                t.as_str().map(str::to_string).ok_or_else(|| {
                    PipelineError::invalid_param(&node.name, EVENT_TYPES_PARAM, "expected strings")
                })
            })
            .collect(),
        Some(_) => Err(PipelineError::invalid_param(
            &node.name,
            EVENT_TYPES_PARAM,
            "expected a string or a list of strings",
        )),
    }
}

/// Loads events overlapping the detection interval
pub struct EventFetcherFactory;

impl OperatorFactory for EventFetcherFactory {
    fn node_type(&self) -> &'static str {
        "EventFetcher"
    }

    fn default_output_key(&self) -> &'static str {
        EVENT_FETCHER_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, app: &ApplicationContext) -> PipelineResult<()> {
        if app.event_store.is_none() {
            return Err(PipelineError::MissingCollaborator {
                node: node.name.clone(),
                collaborator: "an event store",
            });
        }
        event_types(node).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let store = ctx
            .app
            .event_store
            .clone()
            .ok_or_else(|| PipelineError::MissingCollaborator {
                node: ctx.node.name.clone(),
                collaborator: "an event store",
            })?;
        Ok(Arc::new(EventFetcherOperator {
            event_types: event_types(&ctx.node)?,
            store,
        }))
    }
}

pub struct EventFetcherOperator {
    event_types: Vec<String>,
    store: Arc<dyn EventStore>,
}

#[async_trait]
impl Operator for EventFetcherOperator {
    async fn execute(
        &self,
        _inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let (start, end) = ctx
            .detection_interval
            .map(|interval| (interval.start, interval.end))
            .unwrap_or((i64::MIN, i64::MAX));
        let query = EventQuery {
            event_types: self.event_types.clone(),
            start,
            end,
        };
        let events = self
            .store
            .fetch_events(&query)
            .await
            .map_err(|e| PipelineError::component("event store", &ctx.node_name, e))?;

        let mut table = DataTable::new(event_columns());
        for event in events {
            table.push_row(vec![
                json!(event.name),
                json!(event.event_type),
                json!(event.start_time),
                json!(event.end_time),
            ]);
        }
        debug!(node_name = %ctx.node_name, event_count = table.row_count(), "Events fetched");

        Ok(single_output(EVENT_FETCHER_OUTPUT_KEY, OperatorResult::Table(table)))
    }
}
