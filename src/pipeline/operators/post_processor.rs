//! Applies a registered post-processor to every detection result among the
//! node's inputs. Combined fork-join results are processed item by item.
//! The node emits one output per input key; non-detection inputs pass
//! through untouched.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{is_template, require_str_param};
use crate::constants::operator_keys::PROP_TYPE;
use crate::pipeline::components::{component_spec, AnomalyPostProcessor, PostProcessorContext};
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::data_table::DetectionResult;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    CombinerResult, ExecutionContext, ForkJoinItemResult, Operator, OperatorOutputs,
    OperatorResult,
};
use crate::pipeline::plan::PlanNodeBean;

pub struct PostProcessorFactory;

impl OperatorFactory for PostProcessorFactory {
    fn node_type(&self) -> &'static str {
        "PostProcessor"
    }

    fn validate(&self, node: &PlanNodeBean, app: &ApplicationContext) -> PipelineResult<()> {
        let post_processor_type = require_str_param(node, PROP_TYPE)?;
        if !is_template(&Value::from(post_processor_type))
            && !app.post_processor_registry.contains(post_processor_type)
        {
            return Err(PipelineError::invalid_param(
                &node.name,
                PROP_TYPE,
                format!("unknown post-processor type '{post_processor_type}'"),
            ));
        }
        Ok(())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let node = &ctx.node;
        let post_processor_type = require_str_param(node, PROP_TYPE)?;
        let post_processor = ctx
            .app
            .post_processor_registry
            .build(post_processor_type, &component_spec(node))
            .ok_or_else(|| {
                PipelineError::invalid_param(
                    &node.name,
                    PROP_TYPE,
                    format!("unknown post-processor type '{post_processor_type}'"),
                )
            })?
            .map_err(|e| PipelineError::component("post-processor", post_processor_type, e))?;

        Ok(Arc::new(PostProcessorOperator {
            post_processor_type: post_processor_type.to_string(),
            post_processor,
        }))
    }
}

pub struct PostProcessorOperator {
    post_processor_type: String,
    post_processor: Arc<dyn AnomalyPostProcessor>,
}

impl PostProcessorOperator {
    fn process_detection(
        &self,
        detection: &DetectionResult,
        node_name: &str,
    ) -> PipelineResult<DetectionResult> {
        let ctx = PostProcessorContext {
            node_name,
            post_processor_type: &self.post_processor_type,
        };
        self.post_processor
            .post_process(detection.clone(), &ctx)
            .map_err(|e| PipelineError::component("post-processor", &self.post_processor_type, e))
    }

    fn process_result(
        &self,
        result: &Arc<OperatorResult>,
        node_name: &str,
    ) -> PipelineResult<Arc<OperatorResult>> {
        match result.as_ref() {
            OperatorResult::Detection(detection) => Ok(Arc::new(OperatorResult::Detection(
                self.process_detection(detection, node_name)?,
            ))),
            OperatorResult::Combined(combined) => {
                let items = combined
                    .items
                    .iter()
                    .map(|item_result| {
                        let outputs = item_result
                            .outputs
                            .iter()
                            .map(|(key, output)| {
                                Ok((key.clone(), self.process_result(output, node_name)?))
                            })
                            .collect::<PipelineResult<OperatorOutputs>>()?;
                        Ok(ForkJoinItemResult {
                            item: item_result.item.clone(),
                            outputs,
                        })
                    })
                    .collect::<PipelineResult<Vec<_>>>()?;
                Ok(Arc::new(OperatorResult::Combined(CombinerResult { items })))
            }
            _ => Ok(Arc::clone(result)),
        }
    }
}

#[async_trait]
impl Operator for PostProcessorOperator {
    async fn execute(
        &self,
        inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        inputs
            .iter()
            .map(|(key, result)| Ok((key.clone(), self.process_result(result, &ctx.node_name)?)))
            .collect()
    }
}
