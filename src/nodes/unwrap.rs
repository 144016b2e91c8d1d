//! Branch-aware unwrapping of upstream data.
//!
//! When a step consumes a branching step's whole output (no source handle
//! on the edge) it receives a `{label: data}` object. Nodes that expect a
//! list call [`unwrap`] to pick the useful part of it.

use serde_json::{Map, Value};

use crate::dsl::NodeType;

fn is_switch_label(key: &str) -> bool {
    key.starts_with("case_") || key == "default"
}

fn looks_like_if(map: &Map<String, Value>) -> bool {
    map.contains_key("TRUE") || map.contains_key("FALSE")
}

fn looks_like_switch(map: &Map<String, Value>) -> bool {
    map.keys().any(|k| is_switch_label(k))
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Numeric order for `case_N` labels; `default` and odd labels sort last.
fn case_rank(label: &str) -> (usize, usize) {
    match label.strip_prefix("case_").and_then(|n| n.parse().ok()) {
        Some(n) => (0, n),
        None => (1, 0),
    }
}

/// Pick the meaningful data out of a branching output.
///
/// Applies when `previous_node_type` is `if`/`switch` or when the object's
/// keys look like branch labels. Anything else is returned unchanged.
pub fn unwrap(data: &Value, previous_node_type: Option<NodeType>) -> Value {
    let Value::Object(map) = data else {
        return data.clone();
    };

    let switch_shaped = match previous_node_type {
        Some(NodeType::Switch) => true,
        Some(NodeType::If) => false,
        _ => looks_like_switch(map) && !looks_like_if(map),
    };
    let if_shaped = match previous_node_type {
        Some(NodeType::If) => true,
        Some(NodeType::Switch) => false,
        _ => looks_like_if(map),
    };

    if switch_shaped {
        return unwrap_switch(map).unwrap_or_else(|| {
            tracing::debug!("No non-empty switch branch, passing data through");
            data.clone()
        });
    }
    if if_shaped {
        return unwrap_if(map).unwrap_or_else(|| {
            tracing::debug!("Both if branches empty, passing data through");
            data.clone()
        });
    }
    data.clone()
}

fn unwrap_switch(map: &Map<String, Value>) -> Option<Value> {
    let mut cases: Vec<(&String, &Value)> = map
        .iter()
        .filter(|(k, _)| k.starts_with("case_"))
        .collect();
    cases.sort_by_key(|(k, _)| case_rank(k));
    cases
        .into_iter()
        .map(|(_, v)| v)
        .find(|v| is_non_empty(v))
        .or_else(|| map.get("default").filter(|v| is_non_empty(v)))
        .cloned()
}

fn unwrap_if(map: &Map<String, Value>) -> Option<Value> {
    let truthy = map.get("TRUE").filter(|v| is_non_empty(v));
    let falsy = map.get("FALSE").filter(|v| is_non_empty(v));
    match (truthy, falsy) {
        (Some(Value::Array(t)), Some(Value::Array(f))) => {
            Some(Value::Array(t.iter().chain(f.iter()).cloned().collect()))
        }
        (Some(t), _) => Some(t.clone()),
        (None, Some(f)) => Some(f.clone()),
        (None, None) => None,
    }
}
