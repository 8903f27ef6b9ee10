//! # Pipeline Executor
//!
//! Compiles plans and runs them node by node in dependency order.
//!
//! ## Execution model
//!
//! Running a target node executes the target plus everything it reads from
//! through input edges, following the plan's global topological order.
//! Outputs are kept per run; nothing is shared between runs except the
//! compiled plan. The first failing node aborts the run and is reported as
//! `PipelineError::Execution` wrapping the node's error, so downstream nodes
//! never execute.
//!
//! Inside a fork-join item run the item's params are substituted into every
//! executed node's `${...}` templates before the node is built.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, info, instrument};

use super::context::ApplicationContext;
use super::dag::{CompiledNode, CompiledPlan};
use super::errors::{PipelineError, PipelineResult};
use super::node_registry::{NodeRegistry, OperatorContext};
use super::operator::{ExecutionContext, OperatorOutputs};
use super::plan::{EnumerationItem, Plan};
use super::templating::resolve_params;
use crate::config::PipelineConfig;
use crate::logging::log_node_operation;

/// Result of running a plan: the output node's outputs
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub plan_name: String,
    pub output_node: String,
    pub outputs: OperatorOutputs,
}

#[derive(Clone)]
pub struct PipelineExecutor {
    registry: Arc<NodeRegistry>,
    app: Arc<ApplicationContext>,
    settings: PipelineConfig,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<NodeRegistry>,
        app: Arc<ApplicationContext>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            app,
            settings,
        }
    }

    /// Executor with the builtin operators and no external collaborators
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(NodeRegistry::with_builtin_operators()),
            Arc::new(ApplicationContext::new()),
            PipelineConfig::default(),
        )
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }

    pub fn app(&self) -> &Arc<ApplicationContext> {
        &self.app
    }

    pub fn compile(&self, plan: Plan) -> PipelineResult<Arc<CompiledPlan>> {
        CompiledPlan::compile(plan, &self.registry, &self.app).map(Arc::new)
    }

    /// Compile and run a plan, returning its output node's outputs
    #[instrument(skip(self, plan), fields(plan_name = %plan.name))]
    pub async fn run(&self, plan: Plan) -> PipelineResult<PipelineOutputs> {
        let compiled = self.compile(plan)?;
        let started = Instant::now();
        let outputs = self
            .execute_target(Arc::clone(&compiled), compiled.output_node.clone(), None)
            .await?;

        info!(
            plan_name = %compiled.name,
            output_node = %compiled.output_node,
            output_count = outputs.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "✅ Pipeline completed"
        );

        Ok(PipelineOutputs {
            plan_name: compiled.name.clone(),
            output_node: compiled.output_node.clone(),
            outputs,
        })
    }

    /// Run `target` and its input ancestors, returning the target's outputs.
    ///
    /// Boxed because fork-join operators call back into it.
    pub fn execute_target(
        &self,
        plan: Arc<CompiledPlan>,
        target: String,
        item: Option<EnumerationItem>,
    ) -> BoxFuture<'static, PipelineResult<OperatorOutputs>> {
        let executor = self.clone();
        async move {
            let order = plan.execution_order_for(&target)?;
            let mut results: HashMap<String, OperatorOutputs> = HashMap::with_capacity(order.len());

            for name in order {
                let node = plan.node(&name)?;
                let outputs = executor
                    .execute_node(&plan, node, &results, item.as_ref())
                    .await?;
                results.insert(name, outputs);
            }

            results
                .remove(&target)
                .ok_or(PipelineError::NodeNotFound { name: target })
        }
        .boxed()
    }

    async fn execute_node(
        &self,
        plan: &Arc<CompiledPlan>,
        node: &CompiledNode,
        results: &HashMap<String, OperatorOutputs>,
        item: Option<&EnumerationItem>,
    ) -> PipelineResult<OperatorOutputs> {
        let mut bean = node.bean.clone();
        if let Some(item) = item {
            bean.params = resolve_params(&bean.name, &bean.params, &item.params)?;
        }

        let operator = node.factory.build(OperatorContext {
            node: bean,
            app: Arc::clone(&self.app),
        })?;
        let inputs = bind_inputs(node, results)?;

        let ctx = ExecutionContext {
            plan: Arc::clone(plan),
            executor: self.clone(),
            node_name: node.bean.name.clone(),
            detection_interval: plan.detection_interval,
            enumeration_item: item.cloned(),
        };

        debug!(
            node_name = %node.bean.name,
            node_type = %node.bean.node_type,
            enumeration_item = item.map(|i| i.name.as_str()),
            "Executing node"
        );
        let started = Instant::now();
        let outputs = operator
            .execute(&inputs, &ctx)
            .await
            .map_err(|e| PipelineError::Execution {
                node: node.bean.name.clone(),
                source: Box::new(e),
            })?;

        log_node_operation(
            "execute",
            &plan.name,
            &node.bean.name,
            &node.bean.node_type,
            "completed",
            Some(started.elapsed().as_millis() as u64),
        );
        Ok(outputs)
    }
}

fn bind_inputs(
    node: &CompiledNode,
    results: &HashMap<String, OperatorOutputs>,
) -> PipelineResult<OperatorOutputs> {
    let mut inputs = OperatorOutputs::new();
    for binding in &node.bindings {
        let value = results
            .get(&binding.source_node)
            .and_then(|outputs| outputs.get(&binding.source_key))
            .ok_or_else(|| PipelineError::MissingOutput {
                node: binding.source_node.clone(),
                key: binding.source_key.clone(),
            })?;
        inputs.insert(binding.target_key.clone(), Arc::clone(value));
    }
    Ok(inputs)
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}
