use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::NodeResult;
use crate::merge::{merge, MergeOptions};
use crate::nodes::executor::{HandleInput, NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::unwrap::unwrap;
use crate::nodes::utils::parse_config;

/// Natural order for handle names, so `input_10` sorts after `input_2`.
fn compare_handles(a: &str, b: &str) -> Ordering {
    fn split(handle: &str) -> (&str, Option<u64>) {
        let digits = handle.len()
            - handle
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit())
                .count();
        let (prefix, number) = handle.split_at(digits);
        (prefix, number.parse().ok())
    }
    let (pa, na) = split(a);
    let (pb, nb) = split(b);
    pa.cmp(pb).then_with(|| na.cmp(&nb)).then_with(|| a.cmp(b))
}

/// Gathers every incoming edge's data and combines it with the merge engine.
pub struct MergeNodeExecutor;

#[async_trait]
impl NodeExecutor for MergeNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let options: MergeOptions = parse_config(args.resolved_config, "merge")?;

        let mut handles: Vec<&HandleInput> = args.inputs_by_handle.iter().collect();
        handles.sort_by(|a, b| compare_handles(&a.handle, &b.handle));
        let inputs: Vec<Value> = handles
            .iter()
            .map(|input| unwrap(&input.data, Some(input.source_type)))
            .collect();

        tracing::debug!(step = args.step_key, inputs = inputs.len(), "Merging inputs");
        Ok(NodeRunResult::plain(merge(&inputs, &options)?))
    }
}
