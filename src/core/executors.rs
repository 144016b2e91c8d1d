//! Execution strategies.
//!
//! Every node type maps to one [`ExecutorKind`]. The dispatcher hands a step
//! to [`execute`], which runs the node contract and shapes what gets written
//! back to the workflow state.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::dsl::NodeType;
use crate::error::{NodeError, NodeResult};
use crate::nodes::executor::{
    BranchOutput, NodeExecutor, NodeOutput, NodeRunArgs, NodeRunResult,
};
use crate::template::resolve;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// One invocation, one output entry under the step key.
    SingleOutput,
    /// One invocation, one output entry per branch label.
    Branching,
    /// The step fans its items out to its first downstream step.
    ScatterGather,
}

/// Downstream step a scatter/gather step runs once per item.
#[derive(Clone, Copy)]
pub struct ScatterTarget<'a> {
    pub key: &'a str,
    pub node_type: NodeType,
    pub config: &'a Value,
    pub executor: &'a dyn NodeExecutor,
}

/// Output of the downstream step after a scatter/gather run.
#[derive(Debug, Clone, PartialEq)]
pub struct GatheredOutput {
    pub target_key: String,
    /// Raw config of the target; per-item resolutions differ.
    pub input: Value,
    pub results: Vec<Value>,
    pub duration_ms: u64,
}

/// What a strategy produced for the step and, for scatter/gather, for its
/// downstream step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEffect {
    pub result: NodeRunResult,
    pub gathered: Option<GatheredOutput>,
}

impl StepEffect {
    fn single(result: NodeRunResult) -> Self {
        Self {
            result,
            gathered: None,
        }
    }
}

/// Run `executor` for a step of kind `kind`.
pub async fn execute(
    kind: ExecutorKind,
    executor: &dyn NodeExecutor,
    args: NodeRunArgs<'_>,
    target: Option<ScatterTarget<'_>>,
) -> NodeResult<StepEffect> {
    match kind {
        ExecutorKind::SingleOutput => run_single(executor, args).await.map(StepEffect::single),
        ExecutorKind::Branching => run_branching(executor, args).await.map(StepEffect::single),
        ExecutorKind::ScatterGather => run_scatter_gather(executor, args, target).await,
    }
}

async fn run_single(
    executor: &dyn NodeExecutor,
    args: NodeRunArgs<'_>,
) -> NodeResult<NodeRunResult> {
    let mut result = executor.run(args).await?;
    if let NodeOutput::Branches(_) = result.output {
        result.output = NodeOutput::Plain(result.output.to_value());
    }
    Ok(result)
}

async fn run_branching(
    executor: &dyn NodeExecutor,
    args: NodeRunArgs<'_>,
) -> NodeResult<NodeRunResult> {
    let mut result = executor.run(args).await?;
    result.output = normalize_branches(result.output)?;
    Ok(result)
}

/// Accept branch outputs, or a flat `{label: data}` object.
pub fn normalize_branches(output: NodeOutput) -> NodeResult<NodeOutput> {
    match output {
        NodeOutput::Branches(branches) => Ok(NodeOutput::Branches(branches)),
        NodeOutput::Plain(Value::Object(map)) => Ok(NodeOutput::Branches(
            map.into_iter()
                .map(|(label, data)| BranchOutput::new(label, data))
                .collect(),
        )),
        NodeOutput::Plain(other) => Err(NodeError::InputShapeError(format!(
            "Branching node must produce labelled outputs, got {}",
            crate::merge::value_kind(&other)
        ))),
    }
}

/// Batch plan produced by a loop node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopPlan {
    pub items: Vec<Value>,
    pub batch_size: usize,
    pub pause_ms: u64,
    pub continue_on_error: bool,
}

impl LoopPlan {
    pub fn from_output(output: &Value) -> NodeResult<Self> {
        let mut plan: LoopPlan = serde_json::from_value(output.clone())
            .map_err(|e| NodeError::InputShapeError(format!("Invalid loop plan: {}", e)))?;
        if plan.batch_size == 0 {
            plan.batch_size = 1;
        }
        Ok(plan)
    }

    pub fn batch_count(&self) -> usize {
        self.items.len().div_ceil(self.batch_size.max(1))
    }
}

async fn run_scatter_gather(
    executor: &dyn NodeExecutor,
    args: NodeRunArgs<'_>,
    target: Option<ScatterTarget<'_>>,
) -> NodeResult<StepEffect> {
    let planned = run_single(executor, args).await?;
    let NodeOutput::Plain(plan_value) = &planned.output else {
        return Ok(StepEffect::single(planned));
    };
    let plan = LoopPlan::from_output(plan_value)?;

    let Some(target) = target else {
        return Ok(StepEffect::single(planned));
    };
    if plan.items.is_empty() {
        return Ok(StepEffect::single(planned));
    }

    let started = Instant::now();
    let total = plan.items.len();
    let batch_count = plan.batch_count();
    let mut results = Vec::with_capacity(total);
    let mut errors = Vec::new();

    for (batch_index, batch) in plan.items.chunks(plan.batch_size).enumerate() {
        tracing::info!(
            step = args.step_key,
            target = target.key,
            batch = batch_index + 1,
            batches = batch_count,
            "Running loop batch"
        );
        for (offset, item) in batch.iter().enumerate() {
            let index = batch_index * plan.batch_size + offset;
            let mut tokens = args.tokens.clone();
            tokens.set_var("item", item.clone());
            tokens.set_var("index", json!(index));
            tokens.set_var("total", json!(total));
            tokens.set_var("batchIndex", json!(batch_index));
            tokens.set_step(args.step_key, item.clone());

            let resolved = resolve(target.config, &tokens);
            let inner = NodeRunArgs {
                step_key: target.key,
                config: target.config,
                resolved_config: &resolved,
                previous_output: Some(item),
                previous_node_type: Some(NodeType::Loop),
                previous_step_key: Some(args.step_key),
                step_outputs: args.step_outputs,
                tokens: &tokens,
                inputs_by_handle: &[],
                context: args.context,
            };

            match target.executor.run(inner).await {
                Ok(result) => results.push(result.output.to_value()),
                Err(e) if plan.continue_on_error => {
                    tracing::warn!(step = args.step_key, index, error = %e, "Loop item failed");
                    errors.push(json!({
                        "index": index,
                        "item": item,
                        "message": e.to_string(),
                    }));
                }
                Err(e) => {
                    return Err(NodeError::ItemFailed {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }

        if plan.pause_ms > 0 && batch_index + 1 < batch_count {
            tokio::time::sleep(Duration::from_millis(plan.pause_ms)).await;
        }
    }

    let output = json!({
        "items": plan.items,
        "results": results,
        "errorCount": errors.len(),
        "errors": errors,
        "batchCount": batch_count,
    });

    let gathered = GatheredOutput {
        target_key: target.key.to_string(),
        input: target.config.clone(),
        results,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    let mut result = NodeRunResult::plain(output);
    result.metadata = planned.metadata;
    Ok(StepEffect {
        result,
        gathered: Some(gathered),
    })
}
