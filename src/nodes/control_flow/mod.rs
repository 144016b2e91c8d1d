//! Condition-driven nodes: Filter, If, Switch.

pub mod filter;
pub mod if_node;
pub mod switch;

pub use filter::FilterNodeExecutor;
pub use if_node::IfNodeExecutor;
pub use switch::SwitchNodeExecutor;

use serde::Deserialize;
use serde_json::Value;

use crate::error::NodeResult;
use crate::evaluator::{FilterCondition, Logic};
use crate::nodes::utils::parse_config;
use crate::template::{resolve_str, TokenContext};

/// A condition list as it appears in filter, if and switch configs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConditionGroup {
    pub conditions: Vec<FilterCondition>,
    #[serde(alias = "combinator")]
    pub logic: Logic,
}

impl ConditionGroup {
    /// Parse from the raw config so `{{$item}}` fields survive until each item
    /// is evaluated. Compare values see the step-level tokens.
    pub fn from_raw(raw: &Value, node: &str, tokens: &TokenContext) -> NodeResult<Self> {
        let mut group: ConditionGroup = parse_config(raw, node)?;
        group.resolve_values(tokens);
        Ok(group)
    }

    /// Resolve compare values against step-level tokens and compile regex
    /// patterns, once per node run.
    pub fn resolve_values(&mut self, tokens: &TokenContext) {
        for condition in &mut self.conditions {
            if condition.value.contains("{{") {
                condition.value = resolve_str(&condition.value, tokens);
            }
            condition.prepare();
        }
    }
}
