use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::require_str_param;
use crate::constants::operator_keys::SQL_EXECUTION_OUTPUT_KEY;
use crate::pipeline::context::{ApplicationContext, SqlEngine};
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::PlanNodeBean;

pub const SQL_PARAM: &str = "sql";

/// Runs a query over the input tables, each registered under its input key
pub struct SqlExecutionFactory;

impl OperatorFactory for SqlExecutionFactory {
    fn node_type(&self) -> &'static str {
        "SqlExecution"
    }

    fn default_output_key(&self) -> &'static str {
        SQL_EXECUTION_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, app: &ApplicationContext) -> PipelineResult<()> {
        if app.sql_engine.is_none() {
            return Err(PipelineError::MissingCollaborator {
                node: node.name.clone(),
                collaborator: "a SQL engine",
            });
        }
        require_str_param(node, SQL_PARAM).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let engine = ctx
            .app
            .sql_engine
            .clone()
            .ok_or_else(|| PipelineError::MissingCollaborator {
                node: ctx.node.name.clone(),
                collaborator: "a SQL engine",
            })?;
        Ok(Arc::new(SqlExecutionOperator {
            sql: require_str_param(&ctx.node, SQL_PARAM)?.to_string(),
            engine,
        }))
    }
}

pub struct SqlExecutionOperator {
    sql: String,
    engine: Arc<dyn SqlEngine>,
}

#[async_trait]
impl Operator for SqlExecutionOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let tables = inputs
            .iter()
            .map(|(key, result)| {
                result
                    .as_table()
                    .map(|table| (key.clone(), table.clone()))
                    .ok_or_else(|| {
                        PipelineError::invalid_input(
                            &ctx.node_name,
                            key,
                            format!("expected a table, got {}", result.kind()),
                        )
                    })
            })
            .collect::<PipelineResult<BTreeMap<_, _>>>()?;

        let table = self
            .engine
            .execute(&self.sql, &tables)
            .await
            .map_err(|e| PipelineError::component("SQL engine", &ctx.node_name, e))?;
        Ok(single_output(SQL_EXECUTION_OUTPUT_KEY, OperatorResult::Table(table)))
    }
}
