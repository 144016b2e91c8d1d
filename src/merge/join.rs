use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::value_kind;
use crate::error::{NodeError, NodeResult};
use crate::template::{get_path, parse_path, stringify_value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Outer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinOptions {
    pub join_type: JoinType,
    /// Path of the key in items of the first input.
    #[serde(alias = "leftKey")]
    pub join_key1: String,
    /// Path of the key in items of the second input.
    #[serde(alias = "rightKey")]
    pub join_key2: String,
    /// Shallow-merge matched pairs instead of emitting `{left, right}`.
    pub flatten: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            join_type: JoinType::Inner,
            join_key1: "id".to_string(),
            join_key2: "id".to_string(),
            flatten: true,
        }
    }
}

fn key_of(item: &Value, path: &str) -> Option<String> {
    get_path(item, &parse_path(path))
        .filter(|v| !v.is_null())
        .map(stringify_value)
}

fn as_records<'a>(input: &'a Value, side: &str) -> NodeResult<&'a Vec<Value>> {
    input.as_array().ok_or_else(|| {
        NodeError::InputShapeError(format!(
            "Join requires the {} input to be an array, got {}",
            side,
            value_kind(input)
        ))
    })
}

fn combine(left: Option<&Value>, right: Option<&Value>, flatten: bool) -> Value {
    if !flatten {
        return json!({
            "left": left.cloned().unwrap_or(Value::Null),
            "right": right.cloned().unwrap_or(Value::Null),
        });
    }
    let mut row = Map::new();
    for (label, side) in [("left", left), ("right", right)] {
        match side {
            Some(Value::Object(map)) => {
                row.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())))
            }
            // non-object rows cannot be spread; keep them whole
            Some(other) => {
                row.insert(label.to_string(), other.clone());
            }
            None => {}
        }
    }
    Value::Object(row)
}

/// Hash join of two record arrays. Key values compare by their string form.
pub fn join(left: &Value, right: &Value, options: &JoinOptions) -> NodeResult<Value> {
    let left_items = as_records(left, "first")?;
    let right_items = as_records(right, "second")?;

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (pos, item) in right_items.iter().enumerate() {
        if let Some(key) = key_of(item, &options.join_key2) {
            index.entry(key).or_default().push(pos);
        }
    }

    let mut matched_right = vec![false; right_items.len()];
    let mut rows = Vec::new();
    for item in left_items {
        let matches = key_of(item, &options.join_key1)
            .and_then(|key| index.get(&key))
            .filter(|positions| !positions.is_empty());
        match matches {
            Some(positions) => {
                for &pos in positions {
                    matched_right[pos] = true;
                    rows.push(combine(Some(item), Some(&right_items[pos]), options.flatten));
                }
            }
            None => {
                if options.join_type != JoinType::Inner {
                    rows.push(combine(Some(item), None, options.flatten));
                }
            }
        }
    }

    if options.join_type == JoinType::Outer {
        for (pos, item) in right_items.iter().enumerate() {
            if !matched_right[pos] {
                rows.push(combine(None, Some(item), options.flatten));
            }
        }
    }

    Ok(Value::Array(rows))
}
