use std::sync::Arc;

use async_trait::async_trait;

use super::require_param;
use crate::constants::operator_keys::ENUMERATOR_OUTPUT_KEY;
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::{EnumerationItem, PlanNodeBean};

pub const ITEMS_PARAM: &str = "items";

/// Emits the static list of enumeration items in its `items` param
pub struct EnumeratorFactory;

fn parse_items(node: &PlanNodeBean) -> PipelineResult<Vec<EnumerationItem>> {
    let raw = require_param(node, ITEMS_PARAM)?;
    serde_json::from_value(raw.clone())
        .map_err(|e| PipelineError::invalid_param(&node.name, ITEMS_PARAM, e.to_string()))
}

impl OperatorFactory for EnumeratorFactory {
    fn node_type(&self) -> &'static str {
        "Enumerator"
    }

    fn default_output_key(&self) -> &'static str {
        ENUMERATOR_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, _app: &ApplicationContext) -> PipelineResult<()> {
        parse_items(node).map(|_| ())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        Ok(Arc::new(EnumeratorOperator {
            items: parse_items(&ctx.node)?,
        }))
    }
}

pub struct EnumeratorOperator {
    items: Vec<EnumerationItem>,
}

#[async_trait]
impl Operator for EnumeratorOperator {
    async fn execute(
        &self,
        _inputs: &OperatorOutputs,
        _ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        Ok(single_output(
            ENUMERATOR_OUTPUT_KEY,
            OperatorResult::Enumeration(self.items.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_items_must_be_enumeration_items() {
        let factory = EnumeratorFactory;
        let app = ApplicationContext::new();

        let good = PlanNodeBean::new("e", "Enumerator")
            .with_param(ITEMS_PARAM, json!([{"name": "us", "params": {"region": "us"}}]));
        assert!(factory.validate(&good, &app).is_ok());

        let bad = PlanNodeBean::new("e", "Enumerator").with_param(ITEMS_PARAM, json!([1, 2]));
        assert!(matches!(
            factory.validate(&bad, &app),
            Err(PipelineError::InvalidParam { .. })
        ));

        let missing = PlanNodeBean::new("e", "Enumerator");
        assert!(matches!(
            factory.validate(&missing, &app),
            Err(PipelineError::MissingParam { .. })
        ));
    }
}
