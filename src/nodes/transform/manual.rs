use async_trait::async_trait;
use serde_json::Value;

use crate::error::NodeResult;
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};

/// Emits the sample `data` configured on the step.
///
/// A string that holds JSON is parsed; any other string is emitted as text.
pub struct ManualNodeExecutor;

#[async_trait]
impl NodeExecutor for ManualNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let data = match args.resolved_config.get("data") {
            Some(Value::String(text)) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            Some(other) => other.clone(),
            None => Value::Null,
        };
        Ok(NodeRunResult::plain(data))
    }
}
