//! Typed filter conditions evaluated against JSON items.

pub mod condition;
pub mod operators;
pub mod type_coercion;

pub use condition::{
    evaluate, evaluate_all, matches_all, resolve_field, EvalContext, FieldType, FilterCondition,
    FilterMode, FilterPartition, Logic,
};
pub use operators::ConditionOperator;
