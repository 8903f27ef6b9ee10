//! Builtin operator types.

pub mod anomaly_detector;
pub mod combiner;
pub mod data_fetcher;
pub mod delay;
pub mod echo;
pub mod enumerator;
pub mod event_fetcher;
pub mod event_trigger;
pub mod fork_join;
pub mod post_processor;
pub mod sql_execution;
pub mod time_index_filler;

use serde_json::Value;

use super::data_table::DataTable;
use super::errors::{PipelineError, PipelineResult};
use super::operator::OperatorOutputs;
use super::plan::PlanNodeBean;

pub(crate) fn require_param<'a>(node: &'a PlanNodeBean, key: &str) -> PipelineResult<&'a Value> {
    node.param(key)
        .ok_or_else(|| PipelineError::missing_param(&node.name, key))
}

pub(crate) fn require_str_param<'a>(node: &'a PlanNodeBean, key: &str) -> PipelineResult<&'a str> {
    require_param(node, key)?
        .as_str()
        .ok_or_else(|| PipelineError::invalid_param(&node.name, key, "expected a string"))
}

pub(crate) fn optional_str_param<'a>(
    node: &'a PlanNodeBean,
    key: &str,
    default: &'a str,
) -> PipelineResult<&'a str> {
    match node.param(key) {
        None => Ok(default),
        Some(value) => value
            .as_str()
            .ok_or_else(|| PipelineError::invalid_param(&node.name, key, "expected a string")),
    }
}

pub(crate) fn optional_u64_param(
    node: &PlanNodeBean,
    key: &str,
) -> PipelineResult<Option<u64>> {
    match node.param(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            PipelineError::invalid_param(&node.name, key, "expected a non-negative integer")
        }),
    }
}

/// [`optional_u64_param`] for `validate`: a `${...}` value is accepted as
/// unknown until it is resolved for an item
pub(crate) fn validate_u64_param(node: &PlanNodeBean, key: &str) -> PipelineResult<Option<u64>> {
    if node.param(key).is_some_and(is_template) {
        return Ok(None);
    }
    optional_u64_param(node, key)
}

/// Whether a param value is still a `${...}` template resolved per item
pub(crate) fn is_template(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.contains("${"))
}

/// The table bound under `preferred_key`, or else the only table input
pub(crate) fn table_input<'a>(
    node: &str,
    inputs: &'a OperatorOutputs,
    preferred_key: &str,
) -> PipelineResult<&'a DataTable> {
    if let Some(result) = inputs.get(preferred_key) {
        return result.as_table().ok_or_else(|| {
            PipelineError::invalid_input(node, preferred_key, format!("expected a table, got {}", result.kind()))
        });
    }
    let mut tables = inputs.values().filter_map(|r| r.as_table());
    match (tables.next(), tables.next()) {
        (Some(table), None) => Ok(table),
        (None, _) => Err(PipelineError::invalid_input(node, preferred_key, "no table input bound")),
        (Some(_), Some(_)) => Err(PipelineError::invalid_input(
            node,
            preferred_key,
            "several table inputs bound; bind one under this key",
        )),
    }
}
