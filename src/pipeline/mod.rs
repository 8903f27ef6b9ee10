//! # Detection Pipeline
//!
//! Compiles a [`Plan`] of typed nodes into a dependency graph and runs it.
//!
//! Nodes exchange named [`OperatorResult`]s. A node declares inputs from other
//! nodes' outputs; the executor runs every input ancestor of the output node
//! in dependency order. Fork-join nodes fan a sub-graph out over the items of
//! an enumeration and combine the results.
//!
//! Node behavior is pluggable through [`OperatorFactory`] implementations in a
//! [`NodeRegistry`]. Detectors and post-processors used by the builtin
//! operators are resolved from the [`ApplicationContext`] registries.

pub mod components;
pub mod context;
pub mod dag;
pub mod data_table;
pub mod errors;
pub mod executor;
pub mod in_memory;
pub mod node_registry;
pub mod operator;
pub mod operators;
pub mod plan;
pub mod templating;

pub use components::{
    AnomalyDetector, AnomalyPostProcessor, DetectorRegistry, PostProcessorContext,
    PostProcessorRegistry,
};
pub use context::{
    ApplicationContext, DataFetchRequest, DataSource, DataSourceCache, Event, EventQuery,
    EventStore, SqlEngine,
};
pub use dag::{CompiledPlan, EdgeKind};
pub use data_table::{Anomaly, AnomalyLabel, DataTable, DetectionResult};
pub use errors::{BoxError, PipelineError, PipelineResult};
pub use executor::{PipelineExecutor, PipelineOutputs};
pub use in_memory::{InMemoryDataSourceCache, InMemoryEventStore, StaticDataSource};
pub use node_registry::{NodeRegistry, OperatorContext, OperatorFactory};
pub use operator::{
    CombinerResult, ExecutionContext, ForkJoinItemResult, Operator, OperatorOutputs,
    OperatorResult,
};
pub use plan::{DetectionInterval, EnumerationItem, Plan, PlanNodeBean, PlanNodeInput};
