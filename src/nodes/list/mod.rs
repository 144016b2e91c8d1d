//! List nodes: Sort, Limit, Aggregate.

pub mod aggregate;
pub mod limit;
pub mod sort;

pub use aggregate::AggregateNodeExecutor;
pub use limit::LimitNodeExecutor;
pub use sort::SortNodeExecutor;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::template::{get_path, parse_path};

/// Value of `field` inside `item`; the item itself when `field` is empty.
pub(crate) fn field_value<'a>(item: &'a Value, field: &str) -> Option<&'a Value> {
    if field.trim().is_empty() {
        return Some(item);
    }
    get_path(item, &parse_path(field))
}

/// First field of the first object item holding a number.
pub(crate) fn detect_numeric_field(items: &[Value]) -> Option<String> {
    items
        .iter()
        .find_map(Value::as_object)?
        .iter()
        .find(|(_, v)| v.is_number())
        .map(|(k, _)| k.clone())
}

/// Accept counts written as numbers or numeric strings, which is what a
/// resolved embedded token produces.
pub(crate) fn lenient_count<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<usize>, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    let count = match &raw {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(|f| f.max(0.0) as usize),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(
            s.trim()
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("not a number: {}", s)))?
                .max(0.0) as usize,
        ),
        other => {
            return Err(serde::de::Error::custom(format!(
                "expected a number, got {}",
                other
            )))
        }
    };
    Ok(count)
}
