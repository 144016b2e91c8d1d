//! Combining several upstream outputs into one value.
//!
//! Three modes: `append` concatenates arrays, `merge` folds objects key by
//! key, `join` matches two arrays of records on a key.

mod join;

pub use join::{join, JoinOptions, JoinType};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

use crate::error::{NodeError, NodeResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    #[default]
    Append,
    Merge,
    Join,
}

/// How `merge` mode resolves a key present in more than one input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    #[default]
    LastWins,
    FirstWins,
    CombineArray,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MergeOptions {
    pub mode: MergeMode,
    /// Drop structurally equal items in `append` mode.
    #[serde(alias = "dedup", alias = "removeDuplicates")]
    pub deduplicate: bool,
    #[serde(alias = "onConflict")]
    pub conflict_strategy: ConflictStrategy,
    #[serde(flatten)]
    pub join: JoinOptions,
}

/// Combine `inputs` according to `options`.
pub fn merge(inputs: &[Value], options: &MergeOptions) -> NodeResult<Value> {
    match options.mode {
        MergeMode::Append => append(inputs, options.deduplicate),
        MergeMode::Merge => merge_objects(inputs, options.conflict_strategy),
        MergeMode::Join => {
            let [left, right] = inputs else {
                return Err(NodeError::InputShapeError(format!(
                    "Join requires exactly 2 inputs, got {}",
                    inputs.len()
                )));
            };
            join(left, right, &options.join)
        }
    }
}

/// Concatenate array inputs in order, optionally removing duplicates.
pub fn append(inputs: &[Value], deduplicate: bool) -> NodeResult<Value> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (index, input) in inputs.iter().enumerate() {
        let items = input.as_array().ok_or_else(|| {
            NodeError::InputShapeError(format!(
                "Append mode requires every input to be an array; input {} is {}",
                index + 1,
                value_kind(input)
            ))
        })?;
        for item in items {
            if deduplicate && !seen.insert(canonical_key(item)) {
                continue;
            }
            out.push(item.clone());
        }
    }
    Ok(Value::Array(out))
}

/// Fold object inputs left to right.
pub fn merge_objects(inputs: &[Value], strategy: ConflictStrategy) -> NodeResult<Value> {
    let mut out = Map::new();
    // Keys already promoted to arrays by combine_array.
    let mut combined: HashSet<String> = HashSet::new();
    for (index, input) in inputs.iter().enumerate() {
        let object = input.as_object().ok_or_else(|| {
            NodeError::InputShapeError(format!(
                "Merge mode requires every input to be an object; input {} is {}",
                index + 1,
                value_kind(input)
            ))
        })?;
        for (key, value) in object {
            let Some(existing) = out.get_mut(key) else {
                out.insert(key.clone(), value.clone());
                continue;
            };
            match strategy {
                ConflictStrategy::LastWins => *existing = value.clone(),
                ConflictStrategy::FirstWins => {}
                ConflictStrategy::CombineArray => {
                    if combined.insert(key.clone()) {
                        let first = existing.take();
                        *existing = Value::Array(vec![first]);
                    }
                    if let Value::Array(values) = existing {
                        values.push(value.clone());
                    }
                }
            }
        }
    }
    Ok(Value::Object(out))
}

/// Serialized form of a value with object keys sorted, for structural
/// equality.
pub fn canonical_key(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            Value::Object(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
