//! Aggregate node executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use super::{detect_numeric_field, field_value};
use crate::error::NodeResult;
use crate::evaluator::type_coercion::to_text;
use crate::merge::canonical_key;
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{input_items, parse_config};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOperation {
    #[default]
    Count,
    Sum,
    #[serde(alias = "avg", alias = "mean")]
    Average,
    Min,
    Max,
    #[serde(alias = "join")]
    Concatenate,
    Unique,
    First,
    Last,
}

impl AggregateOperation {
    fn is_numeric(self) -> bool {
        matches!(
            self,
            AggregateOperation::Sum
                | AggregateOperation::Average
                | AggregateOperation::Min
                | AggregateOperation::Max
        )
    }
}

fn default_separator() -> String {
    ", ".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AggregateConfig {
    operation: AggregateOperation,
    field: Option<String>,
    group_by: Option<String>,
    separator: String,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            operation: AggregateOperation::default(),
            field: None,
            group_by: None,
            separator: default_separator(),
        }
    }
}

/// Reduces a list to one value, or to one value per `groupBy` key.
pub struct AggregateNodeExecutor;

#[async_trait]
impl NodeExecutor for AggregateNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: AggregateConfig = parse_config(args.resolved_config, "aggregate")?;
        let items = input_items(&args);

        let field = match config.field.clone().filter(|f| !f.trim().is_empty()) {
            Some(field) => field,
            None if config.operation.is_numeric() => {
                detect_numeric_field(&items).unwrap_or_default()
            }
            None => String::new(),
        };

        let Some(group_by) = config.group_by.as_deref().filter(|g| !g.trim().is_empty()) else {
            let result = aggregate(&items, &field, &config);
            return Ok(NodeRunResult::plain(json!({
                "operation": config.operation,
                "field": field,
                "count": items.len(),
                "result": result,
            })));
        };

        // groups keep first-seen order
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for item in items {
            let key_value = field_value(&item, group_by).cloned().unwrap_or(Value::Null);
            let slot = *slots.entry(to_text(&key_value)).or_insert_with(|| {
                groups.push((key_value, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(item);
        }

        let rows: Vec<Value> = groups
            .into_iter()
            .map(|(group, group_items)| {
                json!({
                    "group": group,
                    "count": group_items.len(),
                    "result": aggregate(&group_items, &field, &config),
                })
            })
            .collect();
        Ok(NodeRunResult::plain(Value::Array(rows)))
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn aggregate(items: &[Value], field: &str, config: &AggregateConfig) -> Value {
    let values: Vec<&Value> = items
        .iter()
        .filter_map(|item| field_value(item, field))
        .filter(|v| !v.is_null())
        .collect();
    let numbers = || values.iter().filter_map(|v| number(v));

    match config.operation {
        AggregateOperation::Count => json!(values.len()),
        AggregateOperation::Sum => json!(numbers().sum::<f64>()),
        AggregateOperation::Average => {
            let nums: Vec<f64> = numbers().collect();
            if nums.is_empty() {
                Value::Null
            } else {
                json!(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        AggregateOperation::Min => numbers()
            .reduce(f64::min)
            .map_or(Value::Null, |n| json!(n)),
        AggregateOperation::Max => numbers()
            .reduce(f64::max)
            .map_or(Value::Null, |n| json!(n)),
        AggregateOperation::Concatenate => Value::String(
            values
                .iter()
                .map(|v| to_text(v))
                .collect::<Vec<_>>()
                .join(&config.separator),
        ),
        AggregateOperation::Unique => {
            let mut seen = HashSet::new();
            Value::Array(
                values
                    .into_iter()
                    .filter(|v| seen.insert(canonical_key(v)))
                    .cloned()
                    .collect(),
            )
        }
        AggregateOperation::First => values.first().map_or(Value::Null, |v| (*v).clone()),
        AggregateOperation::Last => values.last().map_or(Value::Null, |v| (*v).clone()),
    }
}
