//! # Node Registry
//!
//! Maps a plan node's `type` tag to the factory that validates and builds
//! its operator.
//!
//! ## Factory responsibilities
//!
//! - `validate`: check params and required collaborators at compile time
//! - `node_references`: name other nodes a node refers to by param
//!   (fork-join); they become reference edges in the DAG
//! - `build`: construct the operator from a node whose params are final

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::context::ApplicationContext;
use super::errors::PipelineResult;
use super::operator::Operator;
use super::operators;
use super::plan::PlanNodeBean;
use crate::constants::operator_keys::DEFAULT_OUTPUT_KEY;

/// Everything a factory may use to build an operator
#[derive(Debug, Clone)]
pub struct OperatorContext {
    /// The node with templates already resolved
    pub node: PlanNodeBean,
    pub app: Arc<ApplicationContext>,
}

pub trait OperatorFactory: Send + Sync {
    fn node_type(&self) -> &'static str;

    /// Key read from this node when a consumer does not name a source property
    fn default_output_key(&self) -> &'static str {
        DEFAULT_OUTPUT_KEY
    }

    fn validate(&self, _node: &PlanNodeBean, _app: &ApplicationContext) -> PipelineResult<()> {
        Ok(())
    }

    fn node_references(&self, _node: &PlanNodeBean) -> PipelineResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn build(&self, ctx: OperatorContext) -> PipelineResult<Arc<dyn Operator>>;
}

#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn OperatorFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every builtin operator type
    pub fn with_builtin_operators() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(operators::echo::EchoFactory));
        registry.register(Arc::new(operators::delay::DelayFactory));
        registry.register(Arc::new(operators::enumerator::EnumeratorFactory));
        registry.register(Arc::new(operators::combiner::CombinerFactory));
        registry.register(Arc::new(operators::fork_join::ForkJoinFactory));
        registry.register(Arc::new(operators::data_fetcher::DataFetcherFactory));
        registry.register(Arc::new(operators::anomaly_detector::AnomalyDetectorFactory));
        registry.register(Arc::new(operators::post_processor::PostProcessorFactory));
        registry.register(Arc::new(operators::event_fetcher::EventFetcherFactory));
        registry.register(Arc::new(operators::event_trigger::EventTriggerFactory));
        registry.register(Arc::new(operators::sql_execution::SqlExecutionFactory));
        registry.register(Arc::new(operators::time_index_filler::TimeIndexFillerFactory));
        registry
    }

    /// Register a factory, replacing any existing one for the same type
    pub fn register(&mut self, factory: Arc<dyn OperatorFactory>) {
        let node_type = factory.node_type();
        if self
            .factories
            .insert(node_type.to_string(), factory)
            .is_some()
        {
            debug!(node_type = node_type, "Operator factory replaced");
        }
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn OperatorFactory>> {
        self.factories.get(node_type).cloned()
    }

    pub fn node_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}
