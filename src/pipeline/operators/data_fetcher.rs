use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::require_str_param;
use crate::constants::operator_keys::DATA_FETCHER_OUTPUT_KEY;
use crate::pipeline::components::component_spec;
use crate::pipeline::context::{ApplicationContext, DataFetchRequest, DataSourceCache};
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::PlanNodeBean;

pub const DATA_SOURCE_PARAM: &str = "component.dataSource";

/// Reads a table from a named data source
pub struct DataFetcherFactory;

impl OperatorFactory for DataFetcherFactory {
    fn node_type(&self) -> &'static str {
        "DataFetcher"
    }

    fn default_output_key(&self) -> &'static str {
        DATA_FETCHER_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, app: &ApplicationContext) -> PipelineResult<()> {
        if app.data_source_cache.is_none() {
            return Err(PipelineError::MissingCollaborator {
                node: node.name.clone(),
                collaborator: "a data source cache",
            });
        }
        require_str_param(node, DATA_SOURCE_PARAM).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let cache = ctx
            .app
            .data_source_cache
            .clone()
            .ok_or_else(|| PipelineError::MissingCollaborator {
                node: ctx.node.name.clone(),
                collaborator: "a data source cache",
            })?;
        Ok(Arc::new(DataFetcherOperator {
            data_source: require_str_param(&ctx.node, DATA_SOURCE_PARAM)?.to_string(),
            spec: component_spec(&ctx.node),
            cache,
        }))
    }
}

pub struct DataFetcherOperator {
    data_source: String,
    spec: Map<String, Value>,
    cache: Arc<dyn DataSourceCache>,
}

#[async_trait]
impl Operator for DataFetcherOperator {
    async fn execute(
        &self,
        _inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let source = self.cache.get_data_source(&self.data_source).ok_or_else(|| {
            PipelineError::component(
                "data source",
                &self.data_source,
                "data source is not registered".into(),
            )
        })?;

        let request = DataFetchRequest {
            spec: self.spec.clone(),
            interval: ctx.detection_interval,
        };
        let table = source
            .fetch(&request)
            .await
            .map_err(|e| PipelineError::component("data source", &self.data_source, e))?;

        debug!(
            node_name = %ctx.node_name,
            data_source = %self.data_source,
            row_count = table.row_count(),
            "Data fetched"
        );
        Ok(single_output(
            DATA_FETCHER_OUTPUT_KEY,
            OperatorResult::Table(table),
        ))
    }
}
