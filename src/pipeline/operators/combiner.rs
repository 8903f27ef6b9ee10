use std::sync::Arc;

use async_trait::async_trait;

use crate::constants::operator_keys::COMBINER_OUTPUT_KEY;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, CombinerResult, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};

/// Input key under which a fork-join hands its per-item results to the combiner
pub const FORK_JOIN_RESULTS_KEY: &str = "forkJoinResults";

/// Merges the ordered per-item results of a fork-join into one result
pub struct CombinerFactory;

impl OperatorFactory for CombinerFactory {
    fn node_type(&self) -> &'static str {
        "Combiner"
    }

    fn default_output_key(&self) -> &'static str {
        COMBINER_OUTPUT_KEY
    }

    fn build(&self, _ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        Ok(Arc::new(CombinerOperator))
    }
}

pub struct CombinerOperator;

#[async_trait]
impl Operator for CombinerOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let items = match inputs.get(FORK_JOIN_RESULTS_KEY).map(|r| r.as_ref()) {
            Some(OperatorResult::ForkJoin(items)) => items.clone(),
            Some(other) => {
                return Err(PipelineError::invalid_input(
                    &ctx.node_name,
                    FORK_JOIN_RESULTS_KEY,
                    format!("expected fork-join results, got {}", other.kind()),
                ))
            }
            None => {
                return Err(PipelineError::invalid_input(
                    &ctx.node_name,
                    FORK_JOIN_RESULTS_KEY,
                    "combiner must be referenced by a fork-join node",
                ))
            }
        };

        Ok(single_output(
            COMBINER_OUTPUT_KEY,
            OperatorResult::Combined(CombinerResult { items }),
        ))
    }
}
