use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::require_param;
use crate::constants::operator_keys::DEFAULT_OUTPUT_KEY;
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::errors::PipelineResult;
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{ExecutionContext, Operator, OperatorOutputs, OperatorResult};
use crate::pipeline::plan::PlanNodeBean;

pub const ECHO_PARAM: &str = "echo";

/// Emits its `echo` param and forwards every input unchanged
pub struct EchoFactory;

impl OperatorFactory for EchoFactory {
    fn node_type(&self) -> &'static str {
        "Echo"
    }

    fn validate(&self, node: &PlanNodeBean, _app: &ApplicationContext) -> PipelineResult<()> {
        require_param(node, ECHO_PARAM).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let echo = require_param(&ctx.node, ECHO_PARAM)?.clone();
        Ok(Arc::new(EchoOperator { echo }))
    }
}

pub struct EchoOperator {
    echo: Value,
}

#[async_trait]
impl Operator for EchoOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        _ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let mut outputs = inputs.clone();
        outputs.insert(
            DEFAULT_OUTPUT_KEY.to_string(),
            Arc::new(OperatorResult::Value(self.echo.clone())),
        );
        Ok(outputs)
    }
}
