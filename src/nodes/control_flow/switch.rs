//! Switch node executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::ConditionGroup;
use crate::error::NodeResult;
use crate::evaluator::matches_all;
use crate::nodes::executor::{BranchOutput, NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{eval_context, input_items, parse_config};

pub const DEFAULT_BRANCH: &str = "default";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// An item goes to the first matching rule only.
    #[default]
    First,
    /// An item goes to every matching rule.
    All,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SwitchConfig {
    rules: Vec<ConditionGroup>,
    match_mode: MatchMode,
}

/// Routes each item to `case_<i>` for the rules it matches, or to `default`.
pub struct SwitchNodeExecutor;

#[async_trait]
impl NodeExecutor for SwitchNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let mut config: SwitchConfig = parse_config(args.config, "switch")?;
        for rule in &mut config.rules {
            rule.resolve_values(args.tokens);
        }
        let ctx = eval_context(&args);

        let mut cases: Vec<Vec<Value>> = vec![Vec::new(); config.rules.len()];
        let mut fallback = Vec::new();
        for item in input_items(&args) {
            let mut matched = false;
            for (i, rule) in config.rules.iter().enumerate() {
                if matches_all(&item, &rule.conditions, rule.logic, &ctx) {
                    cases[i].push(item.clone());
                    matched = true;
                    if config.match_mode == MatchMode::First {
                        break;
                    }
                }
            }
            if !matched {
                fallback.push(item);
            }
        }

        let mut branches: Vec<BranchOutput> = cases
            .into_iter()
            .enumerate()
            .map(|(i, items)| BranchOutput::new(format!("case_{}", i), items.into()))
            .collect();
        branches.push(BranchOutput::new(DEFAULT_BRANCH, fallback.into()));
        Ok(NodeRunResult::branches(branches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::utils::testing::NodeHarness;
    use serde_json::json;

    fn rules() -> Value {
        json!([
            {"conditions": [{"field": "n", "fieldType": "number", "operator": "gte", "value": "5"}]},
            {"conditions": [{"field": "n", "fieldType": "number", "operator": "gte", "value": "1"}]}
        ])
    }

    #[tokio::test]
    async fn test_first_match() {
        let h = NodeHarness::new(json!({"rules": rules()}))
            .with_input(json!([{"n": 7}, {"n": 2}, {"n": 0}]));
        let out = h.output(&SwitchNodeExecutor).await;
        assert_eq!(out["case_0"], json!([{"n": 7}]));
        assert_eq!(out["case_1"], json!([{"n": 2}]));
        assert_eq!(out["default"], json!([{"n": 0}]));
    }

    #[tokio::test]
    async fn test_all_matches() {
        let h = NodeHarness::new(json!({"rules": rules(), "matchMode": "all"}))
            .with_input(json!([{"n": 7}]));
        let out = h.output(&SwitchNodeExecutor).await;
        assert_eq!(out["case_0"], json!([{"n": 7}]));
        assert_eq!(out["case_1"], json!([{"n": 7}]));
        assert_eq!(out["default"], json!([]));
    }

    #[tokio::test]
    async fn test_no_rules_everything_default() {
        let h = NodeHarness::new(json!({})).with_input(json!([1, 2]));
        let result = h.run(&SwitchNodeExecutor).await.unwrap();
        assert_eq!(result.output.branch("default"), Some(&json!([1, 2])));
    }
}
