//! Filter node executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::ConditionGroup;
use crate::error::NodeResult;
use crate::evaluator::{evaluate_all, FilterMode};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{eval_context, input_items, parse_config};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FilterModeConfig {
    mode: FilterMode,
}

/// Keeps the items that pass (`include`) or fail (`exclude`) its conditions.
pub struct FilterNodeExecutor;

#[async_trait]
impl NodeExecutor for FilterNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let group = ConditionGroup::from_raw(args.config, "filter", args.tokens)?;
        let FilterModeConfig { mode } = parse_config(args.config, "filter")?;
        let items = input_items(&args);

        let partition = evaluate_all(
            &items,
            &group.conditions,
            group.logic,
            mode,
            &eval_context(&args),
        );
        let removed_count = partition.rejected.len();
        Ok(NodeRunResult::plain(partition.passed.into()).with_metadata(json!({
            "removed": partition.rejected,
            "removedCount": removed_count,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::utils::testing::NodeHarness;
    use serde_json::Value;

    fn ages() -> Value {
        json!([{"age": 20}, {"age": 30}])
    }

    #[tokio::test]
    async fn test_include_and_exclude() {
        let conditions = json!([{"field": "age", "fieldType": "number", "operator": "gt", "value": "25"}]);
        let h = NodeHarness::new(json!({"conditions": conditions})).with_input(ages());
        let result = h.run(&FilterNodeExecutor).await.unwrap();
        assert_eq!(result.output.to_value(), json!([{"age": 30}]));
        assert_eq!(result.metadata.unwrap()["removedCount"], 1);

        let h = NodeHarness::new(json!({"conditions": conditions, "mode": "exclude"}))
            .with_input(ages());
        assert_eq!(h.output(&FilterNodeExecutor).await, json!([{"age": 20}]));
    }

    #[tokio::test]
    async fn test_item_token_field() {
        let h = NodeHarness::new(json!({"conditions": [
            {"field": "{{$item.age}}", "operator": "lte", "value": 20}
        ]}))
        .with_input(ages());
        assert_eq!(h.output(&FilterNodeExecutor).await, json!([{"age": 20}]));
    }

    #[tokio::test]
    async fn test_value_token_resolved_from_steps() {
        let h = NodeHarness::new(json!({"conditions": [
            {"field": "age", "operator": "equals", "value": "{{steps.prev[1].age}}"}
        ]}))
        .with_input(ages());
        assert_eq!(h.output(&FilterNodeExecutor).await, json!([{"age": 30}]));
    }

    #[tokio::test]
    async fn test_regex_value_from_token() {
        let h = NodeHarness::new(json!({"conditions": [
            {"field": "code", "operator": "regex", "value": "^{{steps.prev[0].code}}-\\d+$"}
        ]}))
        .with_input(json!([{"code": "ab"}, {"code": "ab-12"}, {"code": "ab-x"}, {"code": "cd-3"}]));
        assert_eq!(h.output(&FilterNodeExecutor).await, json!([{"code": "ab-12"}]));
    }

    #[tokio::test]
    async fn test_no_conditions_keeps_everything() {
        let h = NodeHarness::new(json!({})).with_input(ages());
        assert_eq!(h.output(&FilterNodeExecutor).await, ages());
    }
}
