use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use xflow::evaluator::{
    evaluate, evaluate_all, ConditionOperator, EvalContext, FieldType, FilterCondition,
    FilterMode, Logic,
};
use xflow::merge::{merge, MergeOptions};
use xflow::template::{resolve, resolve_str, TokenContext};

fn ctx(tokens: &TokenContext) -> EvalContext<'_> {
    EvalContext::with_now(tokens, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
}

fn cond(field: &str, field_type: FieldType, op: &str, value: &str) -> FilterCondition {
    FilterCondition::new(field, field_type, ConditionOperator::from_name(op), value)
}

#[test]
fn test_pure_token_keeps_type() {
    let mut tokens = TokenContext::new();
    tokens.set_step("a", json!({"x": 5}));
    assert_eq!(resolve(&json!("{{steps.a.x}}"), &tokens), json!(5));
    assert_eq!(resolve(&json!("v={{ steps.a.x }}"), &tokens), json!("v=5"));
    assert_eq!(resolve(&json!("{{steps.a.missing}}"), &tokens), Value::Null);
    assert_eq!(resolve_str("[{{steps.a.missing}}]", &tokens), "[]");
}

#[test]
fn test_path_descends_into_first_array_item() {
    let mut tokens = TokenContext::new();
    tokens.set_step("a", json!([{"name": "Bob"}]));
    assert_eq!(resolve(&json!("{{steps.a.name}}"), &tokens), json!("Bob"));
    assert_eq!(resolve(&json!("{{steps.a[0]['name']}}"), &tokens), json!("Bob"));
}

#[test]
fn test_include_exclude_partition() {
    let tokens = TokenContext::new();
    let items = vec![json!({"age": 20}), json!({"age": 30})];
    let conditions = vec![cond("age", FieldType::Number, "gt", "25")];

    let include = evaluate_all(&items, &conditions, Logic::And, FilterMode::Include, &ctx(&tokens));
    assert_eq!(include.passed, vec![json!({"age": 30})]);
    let exclude = evaluate_all(&items, &conditions, Logic::And, FilterMode::Exclude, &ctx(&tokens));
    assert_eq!(exclude.passed, vec![json!({"age": 20})]);
    assert_eq!(exclude.passed.len() + exclude.rejected.len(), items.len());
}

#[test]
fn test_or_logic() {
    let tokens = TokenContext::new();
    let conditions = vec![
        cond("name", FieldType::String, "equals", "x"),
        cond("name", FieldType::String, "ends_with", "b"),
    ];
    let items = vec![json!({"name": "bob"}), json!({"name": "ann"})];
    let part = evaluate_all(&items, &conditions, Logic::Or, FilterMode::Include, &ctx(&tokens));
    assert_eq!(part.passed, vec![json!({"name": "bob"})]);
}

#[test]
fn test_lenient_fallbacks_never_fail() {
    let tokens = TokenContext::new();
    let c = ctx(&tokens);
    let item = json!({"s": "abc", "d": "2024-05-01"});
    assert!(!evaluate(&item, &cond("s", FieldType::String, "regex", "("), &c));
    assert!(!evaluate(&item, &cond("s", FieldType::String, "no_such_operator", "abc"), &c));
    // an unparseable compare date falls back to the evaluation clock
    assert!(evaluate(&item, &cond("d", FieldType::Date, "before", "soon"), &c));
    assert!(evaluate(&item, &cond("missing", FieldType::String, "not_exists", ""), &c));
}

#[test]
fn test_merge_properties() {
    let dedup: MergeOptions = serde_json::from_value(json!({"mode": "append", "deduplicate": true})).unwrap();
    assert_eq!(
        merge(&[json!([1, 2]), json!([2, 3])], &dedup).unwrap(),
        json!([1, 2, 3])
    );

    let combine: MergeOptions =
        serde_json::from_value(json!({"mode": "merge", "conflictStrategy": "combine_array"})).unwrap();
    assert_eq!(
        merge(&[json!({"a": 1}), json!({"a": 2})], &combine).unwrap(),
        json!({"a": [1, 2]})
    );
}

#[test]
fn test_join_row_counts() {
    let left = json!([{"id": 1}, {"id": 2}]);
    let right = json!([{"id": 1, "v": "x"}]);
    for (join_type, rows) in [("inner", 1), ("left", 2), ("outer", 2)] {
        let options: MergeOptions = serde_json::from_value(json!({
            "mode": "join",
            "joinType": join_type,
            "joinKey1": "id",
            "joinKey2": "id"
        }))
        .unwrap();
        let out = merge(&[left.clone(), right.clone()], &options).unwrap();
        assert_eq!(out.as_array().unwrap().len(), rows, "{}", join_type);
    }
}
