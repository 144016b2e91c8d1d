//! If node executor.

use async_trait::async_trait;

use super::ConditionGroup;
use crate::error::NodeResult;
use crate::evaluator::{evaluate_all, FilterMode};
use crate::nodes::executor::{BranchOutput, NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{eval_context, input_items};

pub const TRUE_BRANCH: &str = "TRUE";
pub const FALSE_BRANCH: &str = "FALSE";

/// Splits its input into a `TRUE` and a `FALSE` branch.
pub struct IfNodeExecutor;

#[async_trait]
impl NodeExecutor for IfNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let group = ConditionGroup::from_raw(args.config, "if", args.tokens)?;
        let items = input_items(&args);
        let partition = evaluate_all(
            &items,
            &group.conditions,
            group.logic,
            FilterMode::Include,
            &eval_context(&args),
        );
        Ok(NodeRunResult::branches(vec![
            BranchOutput::new(TRUE_BRANCH, partition.passed.into()),
            BranchOutput::new(FALSE_BRANCH, partition.rejected.into()),
        ]))
    }
}
