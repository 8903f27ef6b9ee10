//! # Fork-Join
//!
//! Dynamic fan-out over an enumeration and fan-in through a combiner.
//!
//! ## Params
//!
//! - `enumerator`: node producing the enumeration items
//! - `root`: node run once per item, together with its input ancestors, with
//!   the item's params substituted into `${...}` templates
//! - `combiner`: node receiving the ordered per-item results
//! - `parallelism` (optional): overrides the configured number of items
//!   evaluated concurrently
//!
//! Item runs are concurrent up to the parallelism bound, but results are
//! collected in enumeration order. The first failing item fails the node and
//! the remaining in-flight item runs are dropped.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use super::combiner::FORK_JOIN_RESULTS_KEY;
use super::{optional_u64_param, require_str_param, validate_u64_param};
use crate::constants::operator_keys::{
    COMBINER_OUTPUT_KEY, PROP_COMBINER, PROP_ENUMERATOR, PROP_ROOT,
};
use crate::pipeline::context::ApplicationContext;
use crate::pipeline::errors::{PipelineError, PipelineResult};
use crate::pipeline::node_registry::{OperatorContext, OperatorFactory};
use crate::pipeline::operator::{
    single_output, ExecutionContext, ForkJoinItemResult, Operator, OperatorOutputs, OperatorResult,
};
use crate::pipeline::plan::PlanNodeBean;

pub const PARALLELISM_PARAM: &str = "parallelism";

pub struct ForkJoinFactory;

impl OperatorFactory for ForkJoinFactory {
    fn node_type(&self) -> &'static str {
        "ForkJoin"
    }

    fn default_output_key(&self) -> &'static str {
        COMBINER_OUTPUT_KEY
    }

    fn validate(&self, node: &PlanNodeBean, _app: &ApplicationContext) -> PipelineResult<()> {
        if validate_u64_param(node, PARALLELISM_PARAM)? == Some(0) {
            return Err(PipelineError::invalid_param(
                &node.name,
                PARALLELISM_PARAM,
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    fn node_references(&self, node: &PlanNodeBean) -> PipelineResult<Vec<String>> {
        [PROP_ENUMERATOR, PROP_ROOT, PROP_COMBINER]
            .iter()
            .map(|param| require_str_param(node, param).map(str::to_string))
            .collect()
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>> {
        let node = &ctx.node;
        Ok(Arc::new(ForkJoinOperator {
            enumerator: require_str_param(node, PROP_ENUMERATOR)?.to_string(),
            root: require_str_param(node, PROP_ROOT)?.to_string(),
            combiner: require_str_param(node, PROP_COMBINER)?.to_string(),
            parallelism: optional_u64_param(node, PARALLELISM_PARAM)?
                .map(|p| usize::try_from(p).unwrap_or(usize::MAX)),
            app: Arc::clone(&ctx.app),
        }))
    }
}

pub struct ForkJoinOperator {
    enumerator: String,
    root: String,
    combiner: String,
    parallelism: Option<usize>,
    app: Arc<ApplicationContext>,
}

#[async_trait]
impl Operator for ForkJoinOperator {
    async fn execute(
        &self,
        _inputs: &OperatorOutputs,
        ctx: &ExecutionContext,
    ) -> PipelineResult<OperatorOutputs> {
        let enumeration = ctx
            .executor
            .execute_target(
                Arc::clone(&ctx.plan),
                self.enumerator.clone(),
                ctx.enumeration_item.clone(),
            )
            .await?;
        let items = enumeration
            .values()
            .find_map(|result| result.as_enumeration())
            .ok_or_else(|| {
                PipelineError::invalid_input(
                    &ctx.node_name,
                    &self.enumerator,
                    "enumerator produced no enumeration",
                )
            })?
            .to_vec();

        let parallelism = self
            .parallelism
            .unwrap_or(ctx.executor.settings().fork_join_parallelism)
            .max(1);
        info!(
            node_name = %ctx.node_name,
            item_count = items.len(),
            parallelism = parallelism,
            "🔀 Fork-join fan-out"
        );

        let results: Vec<ForkJoinItemResult> = stream::iter(items.into_iter().map(|item| {
            let run = ctx.executor.execute_target(
                Arc::clone(&ctx.plan),
                self.root.clone(),
                Some(item.clone()),
            );
            async move {
                let outputs = run.await?;
                Ok::<_, PipelineError>(ForkJoinItemResult { item, outputs })
            }
        }))
        .buffered(parallelism)
        .try_collect()
        .await?;

        debug!(
            node_name = %ctx.node_name,
            result_count = results.len(),
            "Fork-join items completed, combining"
        );

        let combiner_node = ctx.plan.node(&self.combiner)?;
        let combiner = combiner_node.factory.build(OperatorContext {
            node: combiner_node.bean.clone(),
            app: Arc::clone(&self.app),
        })?;
        let combiner_ctx = ExecutionContext {
            node_name: self.combiner.clone(),
            ..ctx.clone()
        };
        combiner
            .execute(
                &single_output(FORK_JOIN_RESULTS_KEY, OperatorResult::ForkJoin(results)),
                &combiner_ctx,
            )
            .await
            .map_err(|e| PipelineError::Execution {
                node: self.combiner.clone(),
                source: Box::new(e),
            })
    }
}
