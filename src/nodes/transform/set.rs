//! Set node executor.
//!
//! Field values are resolved from the raw config once per item, with
//! `steps.<previous>` and `$item` bound to that item, so a token such as
//! `{{steps.fetch.name}}` yields each item's own name rather than the
//! first one.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use crate::error::{NodeError, NodeResult};
use crate::evaluator::type_coercion::{to_bool, to_text};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{input_data, parse_config};
use crate::template::{parse_path, resolve, set_path, TokenContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "object", alias = "array")]
    Json,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
struct SetField {
    name: String,
    #[serde(default)]
    value: Value,
    #[serde(default, rename = "type")]
    value_type: ValueType,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetConfig {
    #[serde(default, alias = "values", alias = "assignments")]
    fields: Vec<SetField>,
    #[serde(default = "default_true")]
    keep_original: bool,
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(json!(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn coerce(field: &SetField, value: Value) -> NodeResult<Value> {
    match field.value_type {
        ValueType::String => Ok(Value::String(to_text(&value))),
        ValueType::Boolean => Ok(Value::Bool(to_bool(&value))),
        ValueType::Number => match &value {
            Value::Number(_) => Ok(value),
            Value::Null => Ok(Value::Null),
            Value::Bool(b) => Ok(json!(u8::from(*b))),
            other => parse_number(&to_text(other)).ok_or_else(|| {
                NodeError::TypeError(format!(
                    "Field '{}' expects a number, got '{}'",
                    field.name,
                    to_text(other)
                ))
            }),
        },
        ValueType::Json => match value {
            Value::String(text) => serde_json::from_str(&text).map_err(|e| {
                NodeError::TypeError(format!("Field '{}' is not valid JSON: {}", field.name, e))
            }),
            other => Ok(other),
        },
        ValueType::Auto => match value {
            Value::String(text) => Ok(auto_value(text)),
            other => Ok(other),
        },
    }
}

fn auto_value(text: String) -> Value {
    let trimmed = text.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(parsed) = serde_json::from_str(trimmed) {
            return parsed;
        }
    }
    parse_number(trimmed)
        .filter(|_| !trimmed.is_empty())
        .unwrap_or(Value::String(text))
}

/// Writes configured fields onto each incoming item.
pub struct SetNodeExecutor;

impl SetNodeExecutor {
    /// `index` is `None` for a single non-list input, which keeps any
    /// `$index` bound by an enclosing loop.
    fn item_tokens(args: &NodeRunArgs<'_>, item: &Value, index: Option<usize>) -> TokenContext {
        let mut tokens = args.tokens.clone();
        if let Some(previous) = args.previous_step_key {
            tokens.set_step(previous, item.clone());
        }
        match index {
            Some(index) => {
                tokens.set_var("item", item.clone());
                tokens.set_var("index", json!(index));
            }
            None if tokens.get("$item").is_none() => tokens.set_var("item", item.clone()),
            None => {}
        }
        tokens
    }

    fn apply(
        args: &NodeRunArgs<'_>,
        config: &SetConfig,
        item: &Value,
        index: Option<usize>,
    ) -> NodeResult<Value> {
        let tokens = Self::item_tokens(args, item, index);
        let mut target = match item {
            Value::Object(_) if config.keep_original => item.clone(),
            _ => Value::Object(Map::new()),
        };
        for field in &config.fields {
            if field.name.trim().is_empty() {
                continue;
            }
            let value = coerce(field, resolve(&field.value, &tokens))?;
            set_path(&mut target, &parse_path(field.name.trim()), value)?;
        }
        Ok(target)
    }
}

#[async_trait]
impl NodeExecutor for SetNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: SetConfig = parse_config(args.config, "set")?;

        let output = match input_data(&args) {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| Self::apply(&args, &config, item, Some(index)))
                    .collect::<NodeResult<Vec<_>>>()?,
            ),
            Value::Null => Self::apply(&args, &config, &Value::Object(Map::new()), None)?,
            single => Self::apply(&args, &config, &single, None)?,
        };
        Ok(NodeRunResult::plain(output))
    }
}
