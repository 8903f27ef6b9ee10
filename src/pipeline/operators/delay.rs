use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{optional_u64_param, validate_u64_param};
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::errors::PipelineResult;
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{ExecutionContext, Operator, OperatorOutputs};
use crate::pipeline::plan::PlanNodeBean;

pub const DELAY_MILLIS_PARAM: &str = "delayMillis";

/// Sleeps for `delayMillis`, then forwards its inputs
pub struct DelayFactory;

impl OperatorFactory for DelayFactory {
    fn node_type(&self) -> &'static str {
        "Delay"
    }

    fn validate(&self, node: &PlanNodeBean, _app: &ApplicationContext) -> PipelineResult<()> {
        validate_u64_param(node, DELAY_MILLIS_PARAM).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let delay = optional_u64_param(&ctx.node, DELAY_MILLIS_PARAM)?.unwrap_or(0);
        Ok(Arc::new(DelayOperator {
            delay: Duration::from_millis(delay),
        }))
    }
}

pub struct DelayOperator {
    delay: Duration,
}

#[async_trait]
impl Operator for DelayOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        _ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        tokio::time::sleep(self.delay).await;
        Ok(inputs.clone())
    }
}
