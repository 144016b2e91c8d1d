use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use super::condition::FieldType;
use crate::template::stringify_value;

/// Runtime type of a JSON value. `null` has none.
pub fn detect_type(value: &Value) -> Option<FieldType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(FieldType::Boolean),
        Value::Number(_) => Some(FieldType::Number),
        Value::String(_) => Some(FieldType::String),
        Value::Array(_) => Some(FieldType::Array),
        Value::Object(_) => Some(FieldType::Object),
    }
}

/// Pick the type a condition is evaluated as.
///
/// The runtime type wins over the declared one, except for objects (the
/// declared type is kept) and for strings that cleanly coerce to a declared
/// number, boolean or date.
pub fn operative_type(declared: FieldType, actual: &Value) -> FieldType {
    let Some(runtime) = detect_type(actual) else {
        return declared;
    };
    if runtime == declared || runtime == FieldType::Object {
        return declared;
    }
    if let Value::String(s) = actual {
        let keeps_declared = match declared {
            FieldType::Number => parse_number(s).is_some(),
            FieldType::Boolean => parse_bool(s).is_some(),
            FieldType::Date => parse_date_str(s).is_some(),
            _ => false,
        };
        if keeps_declared {
            return declared;
        }
    }
    runtime
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Numeric view of a value. Anything unparseable is `0`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_number(s).unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Boolean view of a value. Strings are true only for `"true"` / `"1"`.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => coerce_bool(s),
        _ => false,
    }
}

/// Compare-value coercion for booleans (case-insensitive `"true"` or `"1"`).
pub fn coerce_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

/// Compare-value coercion for numbers: NaN falls back to `0`.
pub fn coerce_number(s: &str) -> f64 {
    parse_number(s).unwrap_or(0.0)
}

/// Parse a date from a value. Numbers are epoch milliseconds.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Date view of a value; invalid dates fall back to `now`.
pub fn to_date(value: &Value, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_date(value).unwrap_or(now)
}

/// Compare-value coercion for dates; invalid dates fall back to `now`.
pub fn coerce_date(s: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_date_str(s).unwrap_or(now)
}

/// String view used by string operators.
pub fn to_text(value: &Value) -> String {
    stringify_value(value)
}
