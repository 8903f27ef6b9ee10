//! # Plan Compiler
//!
//! Turns a [`Plan`] into a [`CompiledPlan`]: every node resolved to its
//! factory, every input bound to a concrete `(source node, source key) ->
//! target key` triple, and a global topological order.
//!
//! ## Edges
//!
//! - **Input** edges come from declared node inputs and carry data.
//! - **Reference** edges come from params naming other nodes (the
//!   `enumerator`, `root` and `combiner` of a fork-join). They carry no data
//!   but still take part in cycle detection.
//!
//! Compilation fails before anything executes on: duplicate names, unknown
//! types, dangling inputs or references, invalid params, missing
//! collaborators, duplicate input keys, and cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use super::context::ApplicationContext;
use super::errors::{PipelineError, PipelineResult};
use super::node_registry::{NodeRegistry, OperatorFactory};
use super::plan::{DetectionInterval, Plan, PlanNodeBean};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Input,
    Reference,
}

/// One declared input after defaults are applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub source_node: String,
    pub source_key: String,
    pub target_key: String,
}

pub struct CompiledNode {
    pub bean: PlanNodeBean,
    pub factory: Arc<dyn OperatorFactory>,
    pub bindings: Vec<InputBinding>,
}

pub struct CompiledPlan {
    pub name: String,
    pub output_node: String,
    pub detection_interval: Option<DetectionInterval>,
    nodes: HashMap<String, CompiledNode>,
    graph: DiGraph<String, EdgeKind>,
    indices: HashMap<String, NodeIndex>,
    topo_order: Vec<String>,
}

impl CompiledPlan {
    pub fn compile(
        plan: Plan,
        registry: &NodeRegistry,
        app: &ApplicationContext,
    ) -> PipelineResult<Self> {
        let mut factories: HashMap<String, Arc<dyn OperatorFactory>> = HashMap::new();
        for node in &plan.nodes {
            let factory =
                registry
                    .get(&node.node_type)
                    .ok_or_else(|| PipelineError::UnknownOperatorType {
                        node: node.name.clone(),
                        node_type: node.node_type.clone(),
                    })?;
            if factories.insert(node.name.clone(), factory).is_some() {
                return Err(PipelineError::DuplicateNode {
                    name: node.name.clone(),
                });
            }
        }

        let node_exists = |name: &str| -> PipelineResult<()> {
            if factories.contains_key(name) {
                Ok(())
            } else {
                Err(PipelineError::NodeNotFound {
                    name: name.to_string(),
                })
            }
        };

        let output_node = plan.output_node_name().to_string();
        node_exists(&output_node)?;

        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for node in &plan.nodes {
            indices.insert(node.name.clone(), graph.add_node(node.name.clone()));
        }

        let mut nodes = HashMap::new();
        for node in &plan.nodes {
            let factory = Arc::clone(&factories[&node.name]);
            factory.validate(node, app)?;

            let mut bindings = Vec::with_capacity(node.inputs.len());
            let mut seen_keys = HashSet::new();
            for input in &node.inputs {
                node_exists(&input.source_plan_node)?;
                let source_key = input
                    .source_property
                    .clone()
                    .unwrap_or_else(|| {
                        factories[&input.source_plan_node]
                            .default_output_key()
                            .to_string()
                    });
                let target_key = input
                    .target_property
                    .clone()
                    .unwrap_or_else(|| source_key.clone());
                if !seen_keys.insert(target_key.clone()) {
                    return Err(PipelineError::DuplicateInputKey {
                        node: node.name.clone(),
                        key: target_key,
                    });
                }
                graph.add_edge(
                    indices[&input.source_plan_node],
                    indices[&node.name],
                    EdgeKind::Input,
                );
                bindings.push(InputBinding {
                    source_node: input.source_plan_node.clone(),
                    source_key,
                    target_key,
                });
            }

            for reference in factory.node_references(node)? {
                node_exists(&reference)?;
                graph.add_edge(indices[&reference], indices[&node.name], EdgeKind::Reference);
            }

            nodes.insert(
                node.name.clone(),
                CompiledNode {
                    bean: node.clone(),
                    factory,
                    bindings,
                },
            );
        }

        let topo_order = toposort(&graph, None)
            .map_err(|cycle| PipelineError::CyclicPlan {
                node: graph[cycle.node_id()].clone(),
            })?
            .into_iter()
            .map(|index| graph[index].clone())
            .collect();

        debug!(
            plan_name = %plan.name,
            node_count = nodes.len(),
            output_node = %output_node,
            "Plan compiled"
        );

        Ok(Self {
            name: plan.name,
            output_node,
            detection_interval: plan.detection_interval,
            nodes,
            graph,
            indices,
            topo_order,
        })
    }

    pub fn node(&self, name: &str) -> PipelineResult<&CompiledNode> {
        self.nodes.get(name).ok_or_else(|| PipelineError::NodeNotFound {
            name: name.to_string(),
        })
    }

    /// Global topological order over input and reference edges
    pub fn topo_order(&self) -> &[String] {
        &self.topo_order
    }

    /// `target` and everything it transitively reads from, in topological order
    pub fn execution_order_for(&self, target: &str) -> PipelineResult<Vec<String>> {
        let start = *self
            .indices
            .get(target)
            .ok_or_else(|| PipelineError::NodeNotFound {
                name: target.to_string(),
            })?;

        let mut required = HashSet::new();
        let mut stack = vec![start];
        while let Some(index) = stack.pop() {
            if !required.insert(index) {
                continue;
            }
            stack.extend(
                self.graph
                    .edges_directed(index, Direction::Incoming)
                    .filter(|edge| *edge.weight() == EdgeKind::Input)
                    .map(|edge| edge.source()),
            );
        }

        Ok(self
            .topo_order
            .iter()
            .filter(|name| required.contains(&self.indices[name.as_str()]))
            .cloned()
            .collect())
    }
}

impl std::fmt::Debug for CompiledPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPlan")
            .field("name", &self.name)
            .field("output_node", &self.output_node)
            .field("topo_order", &self.topo_order)
            .finish()
    }
}
