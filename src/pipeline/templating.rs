//! `${key}` substitution of node params from an enumeration item.
//!
//! A string that is exactly one reference (`"${threshold}"`) is replaced by
//! the referenced JSON value as-is, keeping its type. References embedded in
//! longer strings are rendered as text. Arrays and objects are walked.

use serde_json::{Map, Value};

use super::errors::{PipelineError, PipelineResult};

pub fn resolve_params(
    node: &str,
    params: &Map<String, Value>,
    values: &Map<String, Value>,
) -> PipelineResult<Map<String, Value>> {
    params
        .iter()
        .map(|(key, value)| Ok((key.clone(), resolve_value(node, value, values)?)))
        .collect()
}

pub fn resolve_value(node: &str, value: &Value, values: &Map<String, Value>) -> PipelineResult<Value> {
    match value {
        Value::String(s) => resolve_string(node, s, values),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(node, item, values))
            .collect::<PipelineResult<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => resolve_params(node, map, values).map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn resolve_string(node: &str, s: &str, values: &Map<String, Value>) -> PipelineResult<Value> {
    if let Some(key) = whole_reference(s) {
        return lookup(node, key, values).cloned();
    }

    let mut rendered = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find("${") {
        let Some(close) = rest[open + 2..].find('}') else {
            break;
        };
        rendered.push_str(&rest[..open]);
        let key = &rest[open + 2..open + 2 + close];
        match lookup(node, key, values)? {
            Value::String(text) => rendered.push_str(text),
            other => rendered.push_str(&other.to_string()),
        }
        rest = &rest[open + 2 + close + 1..];
    }
    rendered.push_str(rest);
    Ok(Value::String(rendered))
}

fn whole_reference(s: &str) -> Option<&str> {
    let key = s.strip_prefix("${")?.strip_suffix('}')?;
    (!key.contains('}') && !key.contains("${")).then_some(key)
}

fn lookup<'a>(node: &str, key: &str, values: &'a Map<String, Value>) -> PipelineResult<&'a Value> {
    values
        .get(key)
        .ok_or_else(|| PipelineError::UnresolvedTemplate {
            node: node.to_string(),
            key: key.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values() -> Map<String, Value> {
        json!({"metric": "revenue", "max": 100, "dims": ["a", "b"]})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_whole_reference_keeps_type() {
        let resolved = resolve_value("n", &json!("${max}"), &values()).unwrap();
        assert_eq!(resolved, json!(100));

        let resolved = resolve_value("n", &json!("${dims}"), &values()).unwrap();
        assert_eq!(resolved, json!(["a", "b"]));
    }

    #[test]
    fn test_embedded_references_render_as_text() {
        let resolved =
            resolve_value("n", &json!("SELECT ${metric} WHERE v < ${max}"), &values()).unwrap();
        assert_eq!(resolved, json!("SELECT revenue WHERE v < 100"));
    }

    #[test]
    fn test_nested_structures_are_walked() {
        let params = json!({"spec": {"column": "${metric}"}, "list": ["${max}", 3]});
        let resolved = resolve_params("n", params.as_object().unwrap(), &values()).unwrap();
        assert_eq!(resolved["spec"]["column"], json!("revenue"));
        assert_eq!(resolved["list"], json!([100, 3]));
    }

    #[test]
    fn test_unknown_key_is_an_error() {
        let err = resolve_value("fetch", &json!("${missing}"), &values()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnresolvedTemplate { ref node, ref key } if node == "fetch" && key == "missing"
        ));
    }

    #[test]
    fn test_unterminated_reference_is_left_alone() {
        let resolved = resolve_value("n", &json!("cost ${max"), &values()).unwrap();
        assert_eq!(resolved, json!("cost ${max"));
    }
}
