use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{input_data, parse_config};
use crate::template::{get_path, parse_path};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SplitConfig {
    #[serde(alias = "fieldToSplitOut", alias = "path")]
    field: Option<String>,
}

/// Turns upstream data into a list of items.
///
/// Arrays pass through. For objects, `field` names the array to extract;
/// without it the object's only array-valued field is used.
pub struct SplitNodeExecutor;

#[async_trait]
impl NodeExecutor for SplitNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: SplitConfig = parse_config(args.resolved_config, "split")?;
        let data = input_data(&args);
        let field = config.field.as_deref().map(str::trim).filter(|f| !f.is_empty());

        let items = match (data, field) {
            (Value::Null, _) => Vec::new(),
            (Value::Array(items), None) => items,
            (data, Some(field)) => match get_path(&data, &parse_path(field)) {
                Some(Value::Array(items)) => items.clone(),
                Some(Value::Null) | None => {
                    return Err(NodeError::ConfigError(format!(
                        "Split field '{}' not found in input",
                        field
                    )))
                }
                Some(other) => vec![other.clone()],
            },
            (Value::Object(map), None) => {
                let arrays: Vec<&String> = map
                    .iter()
                    .filter(|(_, v)| v.is_array())
                    .map(|(k, _)| k)
                    .collect();
                match arrays.as_slice() {
                    [] => vec![Value::Object(map.clone())],
                    [only] => match map.get(only.as_str()) {
                        Some(Value::Array(items)) => items.clone(),
                        _ => Vec::new(),
                    },
                    many => {
                        let names: Vec<&str> = many.iter().map(|k| k.as_str()).collect();
                        return Err(NodeError::ConfigError(format!(
                            "Input has several array fields ({}); set `field` to pick one",
                            names.join(", ")
                        )));
                    }
                }
            }
            (scalar, None) => vec![scalar],
        };

        Ok(NodeRunResult::plain(Value::Array(items)))
    }
}
