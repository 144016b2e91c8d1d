use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::operators::ConditionOperator;
use super::type_coercion::{
    coerce_bool, coerce_date, coerce_number, operative_type, to_bool, to_date, to_number, to_text,
};
use crate::template::{get_path, parse_path, resolve, stringify_value, TokenContext};

/// Declared type of a condition's field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Array,
    Object,
}

/// How multiple conditions combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// Whether matching items are kept or dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

/// One predicate over an item.
///
/// `field` is a path into the item (empty means the item itself) or a token
/// such as `{{$item.age}}`. `value` is always kept as text and coerced per
/// the operative type at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub field_type: FieldType,
    pub operator: ConditionOperator,
    #[serde(default, deserialize_with = "value_as_text")]
    pub value: String,
    #[serde(skip)]
    pattern: CompiledPattern,
}

/// Regex compiled from `value` by [`FilterCondition::prepare`], with the
/// source it was built from. Ignored by equality.
#[derive(Debug, Clone, Default)]
struct CompiledPattern(Option<(String, Option<Regex>)>);

impl PartialEq for CompiledPattern {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl FilterCondition {
    pub fn new(
        field: impl Into<String>,
        field_type: FieldType,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            field_type,
            operator,
            value: value.into(),
            pattern: CompiledPattern::default(),
        }
    }

    /// Compile a regex operator's pattern once, ahead of evaluating many
    /// items. Call again after changing `value`.
    pub fn prepare(&mut self) {
        if matches!(
            self.operator,
            ConditionOperator::Regex | ConditionOperator::NotRegex
        ) {
            self.pattern = CompiledPattern(Some((self.value.clone(), Regex::new(&self.value).ok())));
        }
    }

    /// `None` when `value` is not a valid pattern.
    fn regex_match(&self, text: &str) -> Option<bool> {
        match &self.pattern.0 {
            Some((source, compiled)) if *source == self.value => {
                compiled.as_ref().map(|re| re.is_match(text))
            }
            _ => Regex::new(&self.value).ok().map(|re| re.is_match(text)),
        }
    }
}

fn value_as_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(stringify_value(&raw))
}

/// Items split by a condition set, after the filter mode is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPartition {
    pub passed: Vec<Value>,
    pub rejected: Vec<Value>,
}

/// Ambient inputs for evaluation: token context and the clock used by date
/// fallbacks.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub tokens: &'a TokenContext,
    pub now: DateTime<Utc>,
}

impl<'a> EvalContext<'a> {
    pub fn new(tokens: &'a TokenContext) -> Self {
        Self {
            tokens,
            now: Utc::now(),
        }
    }

    pub fn with_now(tokens: &'a TokenContext, now: DateTime<Utc>) -> Self {
        Self { tokens, now }
    }
}

/// Resolve a condition field against an item. `None` when the path is absent.
pub fn resolve_field(item: &Value, field: &str, ctx: &EvalContext<'_>) -> Option<Value> {
    let field = field.trim();
    if field.is_empty() {
        return Some(item.clone());
    }
    if field.contains("{{") {
        let mut scoped = ctx.tokens.clone();
        scoped.set_var("item", item.clone());
        return match resolve(&Value::String(field.to_string()), &scoped) {
            Value::Null => None,
            other => Some(other),
        };
    }
    get_path(item, &parse_path(field)).cloned()
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Evaluate one condition against one item.
///
/// Never fails: bad regexes and uncoercible compare values fall back to
/// defined results.
pub fn evaluate(item: &Value, condition: &FilterCondition, ctx: &EvalContext<'_>) -> bool {
    let actual = resolve_field(item, &condition.field, ctx);
    let op = &condition.operator;

    match op {
        ConditionOperator::Exists => return actual.as_ref().is_some_and(|v| !v.is_null()),
        ConditionOperator::NotExists => return actual.as_ref().map_or(true, Value::is_null),
        ConditionOperator::IsEmpty => return is_empty_value(actual.as_ref()),
        ConditionOperator::IsNotEmpty => return !is_empty_value(actual.as_ref()),
        ConditionOperator::Unknown(raw) => {
            tracing::debug!(operator = %raw, "unknown condition operator");
            return false;
        }
        _ => {}
    }

    let Some(actual) = actual.filter(|v| !v.is_null()) else {
        return false;
    };

    let field_type = operative_type(condition.field_type, &actual);
    if !op.applies_to(field_type) {
        return false;
    }

    let expected = condition.value.as_str();
    match field_type {
        FieldType::String => eval_string(&to_text(&actual), condition),
        FieldType::Number => eval_number(to_number(&actual), op, coerce_number(expected)),
        FieldType::Boolean => eval_boolean(to_bool(&actual), op, expected),
        FieldType::Date => eval_date(
            to_date(&actual, ctx.now),
            op,
            coerce_date(expected, ctx.now),
        ),
        FieldType::Array => match &actual {
            Value::Array(items) => eval_array(items, op, expected),
            _ => false,
        },
        FieldType::Object => false,
    }
}

fn eval_string(actual: &str, condition: &FilterCondition) -> bool {
    type Op = ConditionOperator;
    let expected = condition.value.as_str();
    match &condition.operator {
        Op::Equals => actual == expected,
        Op::NotEquals => actual != expected,
        Op::Contains => actual.contains(expected),
        Op::NotContains => !actual.contains(expected),
        Op::StartsWith => actual.starts_with(expected),
        Op::NotStartsWith => !actual.starts_with(expected),
        Op::EndsWith => actual.ends_with(expected),
        Op::NotEndsWith => !actual.ends_with(expected),
        Op::Regex => condition.regex_match(actual).unwrap_or(false),
        Op::NotRegex => condition.regex_match(actual).map_or(true, |m| !m),
        _ => false,
    }
}

fn eval_number(actual: f64, op: &ConditionOperator, expected: f64) -> bool {
    use ConditionOperator::*;
    match op {
        Equals => (actual - expected).abs() < f64::EPSILON,
        NotEquals => (actual - expected).abs() >= f64::EPSILON,
        Gt => actual > expected,
        Gte => actual >= expected,
        Lt => actual < expected,
        Lte => actual <= expected,
        _ => false,
    }
}

fn eval_boolean(actual: bool, op: &ConditionOperator, expected: &str) -> bool {
    use ConditionOperator::*;
    match op {
        IsTrue => actual,
        IsFalse => !actual,
        Equals => actual == coerce_bool(expected),
        NotEquals => actual != coerce_bool(expected),
        _ => false,
    }
}

fn eval_date(actual: DateTime<Utc>, op: &ConditionOperator, expected: DateTime<Utc>) -> bool {
    use ConditionOperator::*;
    let (a, e) = (actual.timestamp_millis(), expected.timestamp_millis());
    match op {
        Equals => a == e,
        NotEquals => a != e,
        After => a > e,
        AfterOrEqual => a >= e,
        Before => a < e,
        BeforeOrEqual => a <= e,
        _ => false,
    }
}

fn eval_array(items: &[Value], op: &ConditionOperator, expected: &str) -> bool {
    use ConditionOperator::*;
    let len = items.len() as f64;
    let contains = || items.iter().any(|item| stringify_value(item) == expected);
    match op {
        Contains => contains(),
        NotContains => !contains(),
        LengthEquals => len == coerce_number(expected),
        LengthNotEquals => len != coerce_number(expected),
        LengthGt => len > coerce_number(expected),
        LengthGte => len >= coerce_number(expected),
        LengthLt => len < coerce_number(expected),
        LengthLte => len <= coerce_number(expected),
        _ => false,
    }
}

/// Combine a condition list for one item. An empty list matches.
pub fn matches_all(
    item: &Value,
    conditions: &[FilterCondition],
    logic: Logic,
    ctx: &EvalContext<'_>,
) -> bool {
    if conditions.is_empty() {
        return true;
    }
    match logic {
        Logic::And => conditions.iter().all(|c| evaluate(item, c, ctx)),
        Logic::Or => conditions.iter().any(|c| evaluate(item, c, ctx)),
    }
}

/// Partition items. With `Include`, `passed` holds matching items; with
/// `Exclude`, it holds the items that do not match.
pub fn evaluate_all(
    items: &[Value],
    conditions: &[FilterCondition],
    logic: Logic,
    mode: FilterMode,
    ctx: &EvalContext<'_>,
) -> FilterPartition {
    let mut partition = FilterPartition::default();
    for item in items {
        let matched = matches_all(item, conditions, logic, ctx);
        let keep = match mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        };
        if keep {
            partition.passed.push(item.clone());
        } else {
            partition.rejected.push(item.clone());
        }
    }
    partition
}
