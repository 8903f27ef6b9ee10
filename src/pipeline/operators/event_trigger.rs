//! Persists rows of its table input as events of a fixed type.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{optional_str_param, require_str_param, table_input};
use crate::constants::operator_keys::DEFAULT_OUTPUT_KEY;
use crate::pipeline::context::{ApplicationContext, Event, EventStore};
use crate::pipeline::data_table::DataTable;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::PlanNodeBean;

pub const EVENT_TYPE_PARAM: &str = "eventType";
pub const NAME_COLUMN_PARAM: &str = "nameColumn";
pub const START_TIME_COLUMN_PARAM: &str = "startTimeColumn";
pub const END_TIME_COLUMN_PARAM: &str = "endTimeColumn";

pub struct EventTriggerFactory;

impl OperatorFactory for EventTriggerFactory {
    fn node_type(&self) -> &'static str {
        "EventTrigger"
    }

    fn validate(&self, node: &PlanNodeBean, app: &ApplicationContext) -> PipelineResult<()> {
        if app.event_store.is_none() {
            return Err(PipelineError::MissingCollaborator {
                node: node.name.clone(),
                collaborator: "an event store",
            });
        }
        require_str_param(node, EVENT_TYPE_PARAM)?;
        optional_str_param(node, NAME_COLUMN_PARAM, "name")?;
        optional_str_param(node, START_TIME_COLUMN_PARAM, "startTime")?;
        optional_str_param(node, END_TIME_COLUMN_PARAM, "endTime")?;
        Ok(())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let node = &ctx.node;
        let store = ctx
            .app
            .event_store
            .clone()
            .ok_or_else(|| PipelineError::MissingCollaborator {
                node: node.name.clone(),
                collaborator: "an event store",
            })?;
        Ok(Arc::new(EventTriggerOperator {
            event_type: require_str_param(node, EVENT_TYPE_PARAM)?.to_string(),
            name_column: optional_str_param(node, NAME_COLUMN_PARAM, "name")?.to_string(),
            start_column: optional_str_param(node, START_TIME_COLUMN_PARAM, "startTime")?
                .to_string(),
            end_column: optional_str_param(node, END_TIME_COLUMN_PARAM, "endTime")?.to_string(),
            store,
        }))
    }
}

pub struct EventTriggerOperator {
    event_type: String,
    name_column: String,
    start_column: String,
    end_column: String,
    store: Arc<dyn EventStore>,
}

impl EventTriggerOperator {
    fn to_events(&self, node_name: &str, table: &DataTable) -> PipelineResult<Vec<Event>> {
        (0..table.row_count())
            .map(|row| {
                let name = table
                    .value(row, &self.name_column)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        PipelineError::invalid_input(
                            node_name,
                            &self.name_column,
                            format!("row {row} has no event name"),
                        )
                    })?;
                let time = |column: &str| {
                    table.i64_value(row, column).ok_or_else(|| {
                        PipelineError::invalid_input(
                            node_name,
                            column,
                            format!("row {row} has no integer timestamp"),
                        )
                    })
                };
                Ok(Event {
                    name: name.to_string(),
                    event_type: self.event_type.clone(),
                    start_time: time(&self.start_column)?,
                    end_time: time(&self.end_column)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Operator for EventTriggerOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let table = table_input(&ctx.node_name, inputs, DEFAULT_OUTPUT_KEY)?;
        let events = self.to_events(&ctx.node_name, table)?;
        let saved = events.len();
        self.store
            .save_events(events)
            .await
            .map_err(|e| PipelineError::component("event store", &ctx.node_name, e))?;

        info!(
            node_name = %ctx.node_name,
            event_type = %self.event_type,
            saved_events = saved,
            "📅 Events saved"
        );
        Ok(single_output(
            DEFAULT_OUTPUT_KEY,
            OperatorResult::Value(json!({ "savedEvents": saved })),
        ))
    }
}
