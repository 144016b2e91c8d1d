//! Sort node executor.

use async_trait::async_trait;
use serde::Deserialize;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use super::{detect_numeric_field, field_value};
use crate::error::NodeResult;
use crate::evaluator::type_coercion::{parse_date, to_text};
use crate::nodes::executor::{NodeExecutor, NodeRunArgs, NodeRunResult};
use crate::nodes::utils::{parse_config, require_array};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    #[default]
    Auto,
    Number,
    String,
    Date,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SortConfig {
    field: Option<String>,
    #[serde(alias = "direction")]
    order: SortOrder,
    #[serde(rename = "type", alias = "sortType")]
    sort_type: SortType,
}

/// Stable sort by one field. Missing and null values always go last.
pub struct SortNodeExecutor;

#[async_trait]
impl NodeExecutor for SortNodeExecutor {
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult> {
        let config: SortConfig = parse_config(args.resolved_config, "sort")?;
        let items = require_array(&args, "Sort")?;

        let field = match config.field.filter(|f| !f.trim().is_empty()) {
            Some(field) => field,
            None => detect_numeric_field(&items).unwrap_or_default(),
        };
        let sort_type = match config.sort_type {
            SortType::Auto => detect_sort_type(&items, &field),
            declared => declared,
        };

        let mut keyed: Vec<(SortKey, Value)> = items
            .into_iter()
            .map(|item| (SortKey::of(&item, &field, sort_type), item))
            .collect();
        keyed.sort_by(|(a, _), (b, _)| a.compare(b, config.order));
        let items: Vec<Value> = keyed.into_iter().map(|(_, item)| item).collect();

        Ok(NodeRunResult::plain(Value::Array(items)))
    }
}

fn detect_sort_type(items: &[Value], field: &str) -> SortType {
    let values: Vec<&Value> = items
        .iter()
        .filter_map(|item| field_value(item, field))
        .filter(|v| !v.is_null())
        .collect();
    if values.is_empty() {
        return SortType::String;
    }
    if values.iter().all(|v| v.is_number()) {
        SortType::Number
    } else if values
        .iter()
        .all(|v| v.is_string() && parse_date(v).is_some())
    {
        SortType::Date
    } else {
        SortType::String
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

/// Per-item sort key. Values that do not parse as the sort type rank after
/// those that do and compare as text; missing values rank last.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
    Unparsed(String),
    Missing,
}

impl SortKey {
    fn of(item: &Value, field: &str, sort_type: SortType) -> Self {
        let Some(value) = field_value(item, field).filter(|v| !v.is_null()) else {
            return SortKey::Missing;
        };
        match sort_type {
            SortType::Number => as_number(value)
                .map(SortKey::Number)
                .unwrap_or_else(|| SortKey::Unparsed(to_text(value))),
            SortType::Date => parse_date(value)
                .map(SortKey::Date)
                .unwrap_or_else(|| SortKey::Unparsed(to_text(value))),
            SortType::String | SortType::Auto => SortKey::Text(to_text(value)),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) | SortKey::Date(_) | SortKey::Text(_) => 0,
            SortKey::Unparsed(_) => 1,
            SortKey::Missing => 2,
        }
    }

    fn compare(&self, other: &Self, order: SortOrder) -> Ordering {
        let ord = match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) | (SortKey::Unparsed(a), SortKey::Unparsed(b)) => {
                a.cmp(b)
            }
            _ => return self.rank().cmp(&other.rank()),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}
