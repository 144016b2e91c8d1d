use serde_json::json;

use xflow::dsl::{compute_mappings, DiagnosticLevel};
use xflow::{
    export_flow, parse_flow, validate_flow, Command, EdgeSchema, FlowFormat, NodeType,
    StepSchema, WorkflowError, WorkflowState,
};

const FLOW_JSON: &str = r#"{
    "steps": [
        {"key": "src", "type": "manual", "config": {"data": [{"id": 1}]}},
        {"key": "check", "type": "if", "config": {"conditions": [{"field": "id", "operator": "equals", "value": 1}]}},
        {"key": "shape", "type": "set", "config": {"fields": [{"name": "label", "value": "id {{steps.src.id}}"}]}}
    ],
    "edges": [
        {"source": "src", "target": "check"},
        {"source": "check", "target": "shape", "sourceHandle": "TRUE"}
    ]
}"#;

#[test]
fn test_parse_fills_edge_ids() {
    let doc = parse_flow(FLOW_JSON, FlowFormat::Json).unwrap();
    let ids: Vec<&str> = doc.edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["src->check", "check:TRUE->shape"]);
}

#[test]
fn test_export_import_across_formats() {
    let doc = parse_flow(FLOW_JSON, FlowFormat::Json).unwrap();
    for format in [FlowFormat::Json, FlowFormat::Yaml, FlowFormat::Toml] {
        let text = export_flow(&doc, format).unwrap();
        let back = parse_flow(&text, format).unwrap();
        assert_eq!(back.steps, doc.steps, "{:?}", format);
        assert_eq!(back.edges, doc.edges, "{:?}", format);
        assert!(back.mappings.is_empty());
    }
}

#[test]
fn test_export_includes_mappings() {
    let doc = parse_flow(FLOW_JSON, FlowFormat::Json).unwrap();
    let exported: serde_json::Value =
        serde_json::from_str(&export_flow(&doc, FlowFormat::Json).unwrap()).unwrap();
    assert_eq!(
        exported["mappings"]["shape"]["fields[0].value"],
        json!(["{{steps.src.id}}"])
    );
    assert_eq!(compute_mappings(&doc.steps).len(), 1);
}

#[test]
fn test_yaml_without_edges() {
    let yaml = r#"
steps:
  - key: a
    type: manual
    config:
      data: [1, 2]
  - key: b
    type: limit
    config:
      limit: 1
"#;
    let doc = parse_flow(yaml, FlowFormat::Yaml).unwrap();
    assert_eq!(doc.steps.len(), 2);
    assert!(doc.edges.is_empty());
    assert_eq!(doc.steps[1].node_type, NodeType::Limit);
}

#[test]
fn test_unknown_node_type_rejected() {
    let err = parse_flow(
        r#"{"steps": [{"key": "a", "type": "teleport"}]}"#,
        FlowFormat::Json,
    )
    .unwrap_err();
    assert!(matches!(err, WorkflowError::FlowParseError(_)));
}

#[test]
fn test_validation_reports_cycle_and_unknown_token() {
    let doc = parse_flow(
        r#"{
        "steps": [
            {"key": "a", "type": "manual", "config": {"data": "{{steps.ghost.x}}"}},
            {"key": "b", "type": "limit"}
        ],
        "edges": [
            {"source": "a", "target": "b"},
            {"source": "b", "target": "a"}
        ]
    }"#,
        FlowFormat::Json,
    )
    .unwrap();
    let report = validate_flow(&doc);
    assert!(!report.is_valid);
    assert!(report.errors().iter().any(|d| d.code == "E005"));
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == "W001" && d.level == DiagnosticLevel::Warning));
}

#[test]
fn test_valid_flow_passes() {
    let doc = parse_flow(FLOW_JSON, FlowFormat::Json).unwrap();
    assert!(validate_flow(&doc).into_result().is_ok());
}

#[test]
fn test_state_edits_round_trip_to_document() {
    let doc = parse_flow(FLOW_JSON, FlowFormat::Json).unwrap();
    let mut state = WorkflowState::from_document(doc).unwrap();
    state
        .apply(Command::AddStep(StepSchema::new(
            "top",
            NodeType::Limit,
            json!({"limit": 5}),
        )))
        .unwrap();
    state
        .apply(Command::AddEdge(EdgeSchema::new("shape", "top")))
        .unwrap();
    state
        .apply(Command::SetStepConfigField {
            key: "top".into(),
            path: "limit".into(),
            value: json!(3),
        })
        .unwrap();

    let exported = state.to_document();
    assert_eq!(exported.steps.len(), 4);
    assert_eq!(exported.steps[3].config, json!({"limit": 3}));
    assert!(exported.edges.iter().any(|e| e.id == "shape->top"));

    assert!(matches!(
        state.apply(Command::AddEdge(EdgeSchema::new("shape", "missing"))),
        Err(WorkflowError::StepNotFound(_))
    ));
    assert!(matches!(
        state.apply(Command::AddStep(StepSchema::new("src", NodeType::Manual, json!({})))),
        Err(WorkflowError::DuplicateStep(_))
    ));
}
