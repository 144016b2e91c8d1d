use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::condition::FieldType;

/// Comparison operator of a filter condition.
///
/// Parsing accepts the canonical snake_case names plus a handful of common
/// spellings (`>`, `greater_than`, `isEmpty`, `starts-with`, ...). Anything
/// else becomes [`ConditionOperator::Unknown`], which never matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    IsEmpty,
    IsNotEmpty,
    Exists,
    NotExists,
    Regex,
    NotRegex,
    Gt,
    Gte,
    Lt,
    Lte,
    IsTrue,
    IsFalse,
    After,
    AfterOrEqual,
    Before,
    BeforeOrEqual,
    LengthEquals,
    LengthNotEquals,
    LengthGt,
    LengthGte,
    LengthLt,
    LengthLte,
    Unknown(String),
}

impl ConditionOperator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::NotStartsWith => "not_starts_with",
            Self::EndsWith => "ends_with",
            Self::NotEndsWith => "not_ends_with",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Regex => "regex",
            Self::NotRegex => "not_regex",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::IsTrue => "is_true",
            Self::IsFalse => "is_false",
            Self::After => "after",
            Self::AfterOrEqual => "after_or_equal",
            Self::Before => "before",
            Self::BeforeOrEqual => "before_or_equal",
            Self::LengthEquals => "length_equals",
            Self::LengthNotEquals => "length_not_equals",
            Self::LengthGt => "length_gt",
            Self::LengthGte => "length_gte",
            Self::LengthLt => "length_lt",
            Self::LengthLte => "length_lte",
            Self::Unknown(raw) => raw.as_str(),
        }
    }

    /// Whether the operator is defined for the given operative type.
    pub fn applies_to(&self, field_type: FieldType) -> bool {
        use ConditionOperator::*;
        if matches!(self, Exists | NotExists | IsEmpty | IsNotEmpty) {
            return true;
        }
        match field_type {
            FieldType::String => matches!(
                self,
                Equals
                    | NotEquals
                    | Contains
                    | NotContains
                    | StartsWith
                    | NotStartsWith
                    | EndsWith
                    | NotEndsWith
                    | Regex
                    | NotRegex
            ),
            FieldType::Number => matches!(self, Equals | NotEquals | Gt | Gte | Lt | Lte),
            FieldType::Boolean => matches!(self, IsTrue | IsFalse | Equals | NotEquals),
            FieldType::Date => matches!(
                self,
                Equals | NotEquals | After | AfterOrEqual | Before | BeforeOrEqual
            ),
            FieldType::Array => matches!(
                self,
                Contains
                    | NotContains
                    | LengthEquals
                    | LengthNotEquals
                    | LengthGt
                    | LengthGte
                    | LengthLt
                    | LengthLte
            ),
            FieldType::Object => false,
        }
    }

    /// Parse an operator spelling. Unrecognized names map to `Unknown`.
    pub fn from_name(s: &str) -> Self {
        let normalized = normalize(s);
        match normalized.as_str() {
            "equals" | "equal" | "eq" | "is" | "=" | "==" | "===" => Self::Equals,
            "not_equals" | "not_equal" | "ne" | "neq" | "is_not" | "!=" | "!==" => Self::NotEquals,
            "contains" | "includes" => Self::Contains,
            "not_contains" | "does_not_contain" | "not_includes" => Self::NotContains,
            "starts_with" | "start_with" | "begins_with" => Self::StartsWith,
            "not_starts_with" | "not_start_with" => Self::NotStartsWith,
            "ends_with" | "end_with" => Self::EndsWith,
            "not_ends_with" | "not_end_with" => Self::NotEndsWith,
            "is_empty" | "empty" => Self::IsEmpty,
            "is_not_empty" | "not_empty" => Self::IsNotEmpty,
            "exists" | "exist" | "is_set" => Self::Exists,
            "not_exists" | "not_exist" | "does_not_exist" | "is_not_set" => Self::NotExists,
            "regex" | "matches" | "matches_regex" => Self::Regex,
            "not_regex" | "not_matches" | "not_matches_regex" => Self::NotRegex,
            "gt" | ">" | "greater_than" => Self::Gt,
            "gte" | ">=" | "greater_than_or_equal" | "greater_or_equal" => Self::Gte,
            "lt" | "<" | "less_than" => Self::Lt,
            "lte" | "<=" | "less_than_or_equal" | "less_or_equal" => Self::Lte,
            "is_true" | "true" => Self::IsTrue,
            "is_false" | "false" => Self::IsFalse,
            "after" | "is_after" => Self::After,
            "after_or_equal" | "is_after_or_equal" | "on_or_after" => Self::AfterOrEqual,
            "before" | "is_before" => Self::Before,
            "before_or_equal" | "is_before_or_equal" | "on_or_before" => Self::BeforeOrEqual,
            "length_equals" | "length_equal" | "length_eq" => Self::LengthEquals,
            "length_not_equals" | "length_not_equal" | "length_ne" => Self::LengthNotEquals,
            "length_gt" | "length_greater_than" => Self::LengthGt,
            "length_gte" | "length_greater_than_or_equal" => Self::LengthGte,
            "length_lt" | "length_less_than" => Self::LengthLt,
            "length_lte" | "length_less_than_or_equal" => Self::LengthLte,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl FromStr for ConditionOperator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

/// Lower-case, snake_case form of an operator spelling.
fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len() + 4);
    let mut prev_lower = false;
    for ch in trimmed.chars() {
        if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
        } else if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConditionOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConditionOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_name(&raw))
    }
}
