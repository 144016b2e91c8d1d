use serde_json::{json, Value};

use xflow::core::{RuntimeContext, StepOutputs};
use xflow::nodes::control_flow::{FilterNodeExecutor, IfNodeExecutor, SwitchNodeExecutor};
use xflow::nodes::flow::MergeNodeExecutor;
use xflow::nodes::list::{AggregateNodeExecutor, SortNodeExecutor};
use xflow::nodes::transform::{CodeNodeExecutor, SetNodeExecutor, SplitNodeExecutor};
use xflow::nodes::{HandleInput, NodeExecutor, NodeOutput, NodeRunArgs, NodeRunResult};
use xflow::{resolve, NodeError, NodeType};

/// Runs `executor` with `input` as the output of a manual step `src`.
async fn run_node(
    executor: &dyn NodeExecutor,
    config: Value,
    input: Value,
) -> Result<NodeRunResult, NodeError> {
    let mut outputs = StepOutputs::new();
    outputs.set_plain("src", input.clone());
    let tokens = outputs.token_context();
    let resolved = resolve(&config, &tokens);
    let context = RuntimeContext::default();
    executor
        .run(NodeRunArgs {
            step_key: "node",
            config: &config,
            resolved_config: &resolved,
            previous_output: Some(&input),
            previous_node_type: Some(NodeType::Manual),
            previous_step_key: Some("src"),
            step_outputs: &outputs,
            tokens: &tokens,
            inputs_by_handle: &[],
            context: &context,
        })
        .await
}

fn people() -> Value {
    json!([
        {"name": "Ann", "age": 31, "joined": "2023-05-01"},
        {"name": "Bob", "age": 20, "joined": "2021-01-15"},
        {"name": "Cid", "age": 45, "joined": "2024-11-30"}
    ])
}

#[tokio::test]
async fn test_filter_include_and_exclude() {
    let condition = json!([{"field": "age", "fieldType": "number", "operator": "gt", "value": 25}]);
    let include = run_node(&FilterNodeExecutor, json!({"conditions": condition}), people())
        .await
        .unwrap();
    assert_eq!(include.output.to_value().as_array().unwrap().len(), 2);
    assert_eq!(include.metadata.unwrap()["removedCount"], 1);

    let exclude = run_node(
        &FilterNodeExecutor,
        json!({"conditions": condition, "mode": "exclude"}),
        people(),
    )
    .await
    .unwrap();
    assert_eq!(exclude.output.to_value()[0]["name"], "Bob");
}

#[tokio::test]
async fn test_filter_field_token_per_item() {
    let result = run_node(
        &FilterNodeExecutor,
        json!({"conditions": [{"field": "{{$item.name}}", "operator": "starts_with", "value": "C"}]}),
        people(),
    )
    .await
    .unwrap();
    assert_eq!(result.output.to_value(), json!([people()[2]]));
}

#[tokio::test]
async fn test_if_partition_is_total() {
    let result = run_node(
        &IfNodeExecutor,
        json!({"conditions": [{"field": "joined", "fieldType": "date", "operator": "after", "value": "2022-01-01"}]}),
        people(),
    )
    .await
    .unwrap();
    let NodeOutput::Branches(branches) = &result.output else {
        panic!("if must branch");
    };
    let sizes: Vec<usize> = branches
        .iter()
        .map(|b| b.data.as_array().map(Vec::len).unwrap_or(0))
        .collect();
    assert_eq!(sizes.iter().sum::<usize>(), 3);
    assert_eq!(result.output.branch("TRUE").unwrap().as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_switch_routes_to_default() {
    let result = run_node(
        &SwitchNodeExecutor,
        json!({"rules": [
            {"conditions": [{"field": "age", "fieldType": "number", "operator": "lt", "value": 25}]},
            {"conditions": [{"field": "age", "fieldType": "number", "operator": "gt", "value": 40}]}
        ]}),
        people(),
    )
    .await
    .unwrap();
    assert_eq!(result.output.branch("case_0").unwrap()[0]["name"], "Bob");
    assert_eq!(result.output.branch("case_1").unwrap()[0]["name"], "Cid");
    assert_eq!(result.output.branch("default").unwrap()[0]["name"], "Ann");
}

#[tokio::test]
async fn test_sort_by_date_desc() {
    let result = run_node(
        &SortNodeExecutor,
        json!({"field": "joined", "order": "desc", "type": "date"}),
        people(),
    )
    .await
    .unwrap();
    let names: Vec<Value> = result
        .output
        .to_value()
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Cid"), json!("Ann"), json!("Bob")]);
}

#[tokio::test]
async fn test_set_then_aggregate() {
    let set = run_node(
        &SetNodeExecutor,
        json!({"fields": [{"name": "senior", "value": "{{steps.src.age}}", "type": "number"}], "keepOriginal": false}),
        people(),
    )
    .await
    .unwrap();
    assert_eq!(set.output.to_value(), json!([{"senior": 31}, {"senior": 20}, {"senior": 45}]));

    let avg = run_node(
        &AggregateNodeExecutor,
        json!({"operation": "average"}),
        set.output.to_value(),
    )
    .await
    .unwrap();
    assert_eq!(avg.output.to_value()["result"], json!(32.0));
}

#[tokio::test]
async fn test_split_then_code() {
    let split = run_node(
        &SplitNodeExecutor,
        json!({}),
        json!({"page": 1, "rows": [{"v": 1}, {"v": 2}]}),
    )
    .await
    .unwrap();
    let code = run_node(
        &CodeNodeExecutor,
        json!({"code": "return items.reduce(function (acc, r) { return acc + r.v; }, 0);"}),
        split.output.to_value(),
    )
    .await
    .unwrap();
    assert_eq!(code.output.to_value(), json!(3));
}

#[tokio::test]
async fn test_merge_combine_array() {
    let left = json!({"a": 1});
    let right = json!({"a": 2});
    let inputs = vec![
        HandleInput {
            handle: "input_0".into(),
            source: "l".into(),
            source_type: NodeType::Manual,
            data: left,
        },
        HandleInput {
            handle: "input_1".into(),
            source: "r".into(),
            source_type: NodeType::Manual,
            data: right,
        },
    ];
    let outputs = StepOutputs::new();
    let tokens = outputs.token_context();
    let config = json!({"mode": "merge", "conflictStrategy": "combine_array"});
    let context = RuntimeContext::default();
    let result = MergeNodeExecutor
        .run(NodeRunArgs {
            step_key: "m",
            config: &config,
            resolved_config: &config,
            previous_output: None,
            previous_node_type: None,
            previous_step_key: None,
            step_outputs: &outputs,
            tokens: &tokens,
            inputs_by_handle: &inputs,
            context: &context,
        })
        .await
        .unwrap();
    assert_eq!(result.output.to_value(), json!({"a": [1, 2]}));
}
