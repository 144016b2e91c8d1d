use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use xflow::core::{FakeIdGenerator, FakeTimeProvider};
use xflow::error::NodeResult;
use xflow::{
    parse_flow, Command, EngineConfig, FlowFormat, NodeError, NodeExecutor,
    NodeExecutorRegistry, NodeRunArgs, NodeRunResult, NodeType, RunStatus, RuntimeContext,
    StepDispatcher, WorkflowError, WorkflowState,
};

fn context() -> RuntimeContext {
    RuntimeContext::new(EngineConfig::default())
        .with_time_provider(Arc::new(FakeTimeProvider::new(1_700_000_000)))
        .with_id_generator(Arc::new(FakeIdGenerator::new("t".into())))
}

fn dispatcher(flow: &str) -> StepDispatcher {
    let doc = parse_flow(flow, FlowFormat::Json).unwrap();
    StepDispatcher::from_document(doc, context()).unwrap()
}

/// Counts invocations and fails on items whose `n` is 2.
struct FailOnTwo {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl NodeExecutor for FailOnTwo {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let item = args.previous_output.cloned().unwrap_or(Value::Null);
        if item["n"] == json!(2) {
            return Err(NodeError::ExecutionError("two is not allowed".into()));
        }
        Ok(NodeRunResult::plain(json!({"seen": item["n"]})))
    }
}

fn loop_flow(continue_on_error: bool) -> String {
    json!({
        "steps": [
            {"key": "src", "type": "manual", "config": {"data": [{"n": 1}, {"n": 2}, {"n": 3}]}},
            {"key": "each", "type": "loop", "config": {"batchSize": 2, "continueOnError": continue_on_error}},
            {"key": "work", "type": "code", "config": {"code": "unused"}}
        ],
        "edges": [
            {"source": "src", "target": "each"},
            {"source": "each", "target": "work"}
        ]
    })
    .to_string()
}

fn dispatcher_with_counter(flow: &str) -> (StepDispatcher, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = NodeExecutorRegistry::new();
    registry.register(
        NodeType::Code,
        Box::new(FailOnTwo {
            calls: Arc::clone(&calls),
        }),
    );
    let doc = parse_flow(flow, FlowFormat::Json).unwrap();
    let state = WorkflowState::from_document(doc).unwrap();
    (StepDispatcher::new(state, registry, context()), calls)
}

#[tokio::test]
async fn test_linear_flow() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "src", "type": "manual", "config": {"data": [{"age": 20}, {"age": 30}, {"age": 40}]}},
            {"key": "adults", "type": "filter", "config": {"conditions": [{"field": "age", "fieldType": "number", "operator": "gt", "value": 25}]}},
            {"key": "oldest", "type": "sort", "config": {"field": "age", "order": "desc"}},
            {"key": "one", "type": "limit", "config": {"limit": 1}}
        ],
        "edges": [
            {"source": "src", "target": "adults"},
            {"source": "adults", "target": "oldest"},
            {"source": "oldest", "target": "one"}
        ]
    }"#,
    );
    let summary = d.run_flow().await.unwrap();
    assert_eq!(summary.executed, vec!["src", "adults", "oldest", "one"]);
    assert_eq!(d.state().outputs().get("one"), Some(&json!([{"age": 40}])));
    assert_eq!(d.state().timeline().len(), 4);
}

const TAGGED_LOOP: &str = r#"{
    "steps": [
        {"key": "src", "type": "manual", "config": {"data": [{"n": 1}, {"n": 2}, {"n": 3}, {"n": 4}, {"n": 5}]}},
        {"key": "each", "type": "loop", "config": {"batchSize": 2}},
        {"key": "tag", "type": "set", "config": {"fields": [
            {"name": "pos", "value": "{{$index}}/{{$total}}"},
            {"name": "batch", "value": "{{$batchIndex}}"}
        ]}}
    ],
    "edges": [
        {"source": "src", "target": "each"},
        {"source": "each", "target": "tag"}
    ]
}"#;

#[tokio::test]
async fn test_loop_runs_target_per_item_in_batches() {
    let mut d = dispatcher(TAGGED_LOOP);
    let summary = d.run_flow().await.unwrap();
    assert_eq!(summary.executed, vec!["src", "each"]);
    assert_eq!(summary.skipped, vec!["tag"]);

    let out = d.state().outputs().get("each").unwrap().clone();
    assert_eq!(out["batchCount"], 3);
    assert_eq!(out["errorCount"], 0);
    assert_eq!(out["results"][4], json!({"n": 5, "pos": "4/5", "batch": 2}));

    let tag = d.state().outputs().get("tag").unwrap();
    assert_eq!(tag.as_array().map(Vec::len), Some(5));
    assert_eq!(d.state().run_state("tag").status, RunStatus::Success);
}

#[tokio::test]
async fn test_run_step_on_loop_target_runs_it_once() {
    let mut d = dispatcher(TAGGED_LOOP);
    d.run_step("tag").await.unwrap();

    let tag = d.state().outputs().get("tag").unwrap();
    assert_eq!(tag.as_array().map(Vec::len), Some(5));
    assert_eq!(tag[0], json!({"n": 1, "pos": "0/5", "batch": 0}));

    let runs: Vec<_> = d
        .state()
        .timeline()
        .iter()
        .map(|t| t.step_key.as_str())
        .collect();
    assert_eq!(runs, vec!["src", "each", "tag"]);
}

#[tokio::test]
async fn test_loop_aborts_on_first_item_error() {
    let (mut d, calls) = dispatcher_with_counter(&loop_flow(false));
    let err = d.run_flow().await.unwrap_err();
    assert!(matches!(err, WorkflowError::StepFailed { ref step, .. } if step == "each"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(d.state().run_state("each").status, RunStatus::Failed);
    assert_eq!(d.state().run_state("work").status, RunStatus::Idle);
}

#[tokio::test]
async fn test_loop_counts_errors_when_continuing() {
    let (mut d, calls) = dispatcher_with_counter(&loop_flow(true));
    d.run_flow().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let out = d.state().outputs().get("each").unwrap();
    assert_eq!(out["errorCount"], 1);
    assert_eq!(out["errors"][0]["index"], 1);
    assert_eq!(out["results"], json!([{"seen": 1}, {"seen": 3}]));
}

#[tokio::test]
async fn test_loop_without_items_acts_as_single_step() {
    let (mut d, calls) = dispatcher_with_counter(
        &json!({
            "steps": [
                {"key": "src", "type": "manual", "config": {"data": []}},
                {"key": "each", "type": "loop", "config": {}},
                {"key": "work", "type": "code", "config": {"code": "unused"}}
            ],
            "edges": [
                {"source": "src", "target": "each"},
                {"source": "each", "target": "work"}
            ]
        })
        .to_string(),
    );
    let summary = d.run_flow().await.unwrap();
    assert_eq!(summary.executed, vec!["src", "each", "work"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rerun_leaves_dependents_stale() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "src", "type": "manual", "config": {"data": [1, 2, 3]}},
            {"key": "top", "type": "limit", "config": {"limit": 1}}
        ],
        "edges": [{"source": "src", "target": "top"}]
    }"#,
    );
    d.run_flow().await.unwrap();
    d.apply(Command::UpdateStepConfig {
        key: "src".into(),
        config: json!({"data": [9]}),
    })
    .unwrap();
    d.run_step("src").await.unwrap();

    assert_eq!(d.state().outputs().get("src"), Some(&json!([9])));
    assert_eq!(d.state().outputs().get("top"), Some(&json!([1])));
    assert_eq!(d.state().run_state("top").status, RunStatus::Success);

    d.run_step("top").await.unwrap();
    assert_eq!(d.state().outputs().get("top"), Some(&json!([9])));
}

#[tokio::test]
async fn test_failed_dependency_blocks_step() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "fetch", "type": "http", "config": {"url": ""}},
            {"key": "first", "type": "limit", "config": {"limit": 1}}
        ],
        "edges": [{"source": "fetch", "target": "first"}]
    }"#,
    );
    let err = d.run_step("first").await.unwrap_err();
    match err {
        WorkflowError::DependencyFailed { step, dependency, .. } => {
            assert_eq!(step, "first");
            assert_eq!(dependency, "fetch");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(d.state().run_state("first").status, RunStatus::Idle);
    let failed = d.state().run_state("fetch");
    assert_eq!(failed.status, RunStatus::Failed);
    assert!(failed.record.unwrap().error.is_some());
}

#[tokio::test]
async fn test_flow_stops_at_first_failure() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "a", "type": "manual", "config": {"data": "text"}},
            {"key": "b", "type": "sort", "config": {}},
            {"key": "c", "type": "limit", "config": {}}
        ],
        "edges": [
            {"source": "a", "target": "b"},
            {"source": "b", "target": "c"}
        ]
    }"#,
    );
    assert!(d.run_flow().await.is_err());
    assert_eq!(d.state().run_state("a").status, RunStatus::Success);
    assert_eq!(d.state().run_state("b").status, RunStatus::Failed);
    assert_eq!(d.state().run_state("c").status, RunStatus::Idle);
}

#[tokio::test]
async fn test_if_branches_route_downstream() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "src", "type": "manual", "config": {"data": [{"age": 20}, {"age": 30}, {"age": 40}]}},
            {"key": "check", "type": "if", "config": {"conditions": [{"field": "age", "fieldType": "number", "operator": ">", "value": 25}]}},
            {"key": "young", "type": "aggregate", "config": {"operation": "count", "field": "age"}},
            {"key": "old", "type": "aggregate", "config": {"operation": "sum", "field": "age"}}
        ],
        "edges": [
            {"source": "src", "target": "check"},
            {"source": "check", "target": "young", "sourceHandle": "FALSE"},
            {"source": "check", "target": "old", "sourceHandle": "TRUE"}
        ]
    }"#,
    );
    d.run_flow().await.unwrap();
    let outputs = d.state().outputs();
    let t = outputs.get("check-TRUE").unwrap().as_array().unwrap().len();
    let f = outputs.get("check-FALSE").unwrap().as_array().unwrap().len();
    assert_eq!(t + f, 3);
    assert_eq!(outputs.get("young").unwrap()["result"], 1);
    assert_eq!(outputs.get("old").unwrap()["result"], json!(70.0));
}

#[tokio::test]
async fn test_merge_join_by_handle() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "left", "type": "manual", "config": {"data": [{"id": 1}, {"id": 2}]}},
            {"key": "right", "type": "manual", "config": {"data": [{"id": 1, "v": "x"}]}},
            {"key": "joined", "type": "merge", "config": {"mode": "join", "joinType": "left", "joinKey1": "id", "joinKey2": "id"}}
        ],
        "edges": [
            {"source": "right", "target": "joined", "targetHandle": "input_1"},
            {"source": "left", "target": "joined", "targetHandle": "input_0"}
        ]
    }"#,
    );
    d.run_step("joined").await.unwrap();
    let rows = d.state().outputs().get("joined").unwrap().as_array().unwrap().clone();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_cycle_is_reported() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "a", "type": "manual", "config": {}},
            {"key": "b", "type": "limit", "config": {}}
        ],
        "edges": [
            {"source": "a", "target": "b"},
            {"source": "b", "target": "a"}
        ]
    }"#,
    );
    assert!(matches!(
        d.run_flow().await,
        Err(WorkflowError::CycleDetected(_))
    ));
}

#[tokio::test]
async fn test_tokens_flow_between_steps() {
    let mut d = dispatcher(
        r#"{
        "steps": [
            {"key": "cfg", "type": "manual", "config": {"data": {"max": 2, "name": "Bob"}}},
            {"key": "src", "type": "manual", "config": {"data": [1, 2, 3, 4]}},
            {"key": "cut", "type": "limit", "config": {"limit": "{{steps.cfg.max}}"}}
        ],
        "edges": [
            {"source": "src", "target": "cut"}
        ]
    }"#,
    );
    d.run_step("cfg").await.unwrap();
    d.run_step("cut").await.unwrap();
    assert_eq!(d.state().outputs().get("cut"), Some(&json!([1, 2])));
    let record = d.state().run_state("cut").record.unwrap();
    assert_eq!(record.input, json!({"limit": 2}));
}
