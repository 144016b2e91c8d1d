//! Limit node executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::lenient_count;
use crate::error::NodeResult;
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{input_items, parse_config};

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitFrom {
    #[default]
    Start,
    End,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LimitConfig {
    #[serde(deserialize_with = "lenient_count", alias = "maxItems")]
    limit: Option<usize>,
    #[serde(deserialize_with = "lenient_count")]
    offset: Option<usize>,
    from: LimitFrom,
}

/// Keeps at most `limit` items after skipping `offset`, counted from the
/// start or the end of the list.
pub struct LimitNodeExecutor;

#[async_trait]
impl NodeExecutor for LimitNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: LimitConfig = parse_config(args.resolved_config, "limit")?;
        let items = input_items(&args);
        let limit = config.limit.unwrap_or(DEFAULT_LIMIT);
        let offset = config.offset.unwrap_or(0);

        let kept: Vec<Value> = match config.from {
            LimitFrom::Start => items.into_iter().skip(offset).take(limit).collect(),
            LimitFrom::End => {
                let end = items.len().saturating_sub(offset);
                let start = end.saturating_sub(limit);
                items[start..end].to_vec()
            }
        };
        Ok(NodeRunResult::plain(Value::Array(kept)))
    }
}
