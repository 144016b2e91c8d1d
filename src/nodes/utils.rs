use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{NodeError, NodeResult};
use crate::evaluator::EvalContext;
use crate::nodes::executor::NodeRunArgs;
use crate::nodes::unwrap::unwrap;

/// Deserialize a node config, reporting failures as config errors.
pub fn parse_config<T: DeserializeOwned>(config: &Value, node: &str) -> NodeResult<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| NodeError::ConfigError(format!("Invalid {} config: {}", node, e)))
}

/// Upstream data with branch outputs unwrapped. `Null` for root steps.
pub fn input_data(args: &NodeRunArgs<'_>) -> Value {
    match args.previous_output {
        Some(data) => unwrap(data, args.previous_node_type),
        None => Value::Null,
    }
}

/// Upstream data as a list. A single object becomes a one-item list and a
/// missing input an empty one.
pub fn input_items(args: &NodeRunArgs<'_>) -> Vec<Value> {
    match input_data(args) {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Like [`input_items`] but rejects anything that is not already a list.
pub fn require_array(args: &NodeRunArgs<'_>, node: &str) -> NodeResult<Vec<Value>> {
    match input_data(args) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(NodeError::InputShapeError(format!(
            "{} input must be an array, got {}",
            node,
            crate::merge::value_kind(&other)
        ))),
    }
}

pub fn eval_context<'a>(args: &NodeRunArgs<'a>) -> EvalContext<'a> {
    EvalContext::with_now(args.tokens, args.context.time_provider.now())
}
