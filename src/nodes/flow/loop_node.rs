//! Loop Node executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::list::lenient_count;
use crate::nodes::utils::{input_data, input_items, parse_config};
use crate::template::{get_path, parse_path};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LoopConfig {
    /// Path of the list inside the upstream output. Defaults to the output itself.
    field: Option<String>,
    #[serde(deserialize_with = "lenient_count")]
    batch_size: Option<usize>,
    #[serde(alias = "pauseBetweenBatchesMs", deserialize_with = "lenient_count")]
    pause_ms: Option<usize>,
    continue_on_error: bool,
}

/// Plans batches over the incoming items.
///
/// The output is the plan itself: `{items, batchSize, pauseMs,
/// continueOnError, batches, batchCount}`.
pub struct LoopNodeExecutor;

impl LoopNodeExecutor {
    fn items(args: &NodeRunArgs<'_>, field: Option<&str>) -> NodeResult<Vec<Value>> {
        let Some(field) = field.map(str::trim).filter(|f| !f.is_empty()) else {
            return Ok(input_items(args));
        };
        match get_path(&input_data(args), &parse_path(field)) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(NodeError::InputShapeError(format!(
                "Loop field '{}' is not a list: {}",
                field, other
            ))),
        }
    }
}

#[async_trait]
impl NodeExecutor for LoopNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: LoopConfig = parse_config(args.resolved_config, "loop")?;
        let items = Self::items(&args, config.field.as_deref())?;

        let max_items = args.context.config.loop_max_items;
        if items.len() > max_items {
            return Err(NodeError::ConfigError(format!(
                "Loop has {} items, more than the limit of {}",
                items.len(),
                max_items
            )));
        }

        let batch_size = config.batch_size.unwrap_or(1).max(1);
        let batches: Vec<Value> = items
            .chunks(batch_size)
            .map(|chunk| Value::Array(chunk.to_vec()))
            .collect();

        Ok(NodeRunResult::plain(json!({
            "items": items,
            "batchSize": batch_size,
            "pauseMs": config.pause_ms.unwrap_or(0),
            "continueOnError": config.continue_on_error,
            "batchCount": batches.len(),
            "batches": batches,
        })))
    }
}
