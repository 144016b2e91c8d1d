use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::executors::ExecutorKind;

// ================================
// Node types
// ================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Manual,
    Http,
    Set,
    Split,
    Merge,
    Code,
    Sort,
    Limit,
    Aggregate,
    Wait,
    Filter,
    If,
    Switch,
    Loop,
}

impl NodeType {
    pub const ALL: [NodeType; 14] = [
        NodeType::Manual,
        NodeType::Http,
        NodeType::Set,
        NodeType::Split,
        NodeType::Merge,
        NodeType::Code,
        NodeType::Sort,
        NodeType::Limit,
        NodeType::Aggregate,
        NodeType::Wait,
        NodeType::Filter,
        NodeType::If,
        NodeType::Switch,
        NodeType::Loop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Manual => "manual",
            NodeType::Http => "http",
            NodeType::Set => "set",
            NodeType::Split => "split",
            NodeType::Merge => "merge",
            NodeType::Code => "code",
            NodeType::Sort => "sort",
            NodeType::Limit => "limit",
            NodeType::Aggregate => "aggregate",
            NodeType::Wait => "wait",
            NodeType::Filter => "filter",
            NodeType::If => "if",
            NodeType::Switch => "switch",
            NodeType::Loop => "loop",
        }
    }

    /// Execution strategy for steps of this type.
    pub fn executor_kind(&self) -> ExecutorKind {
        match self {
            NodeType::If | NodeType::Switch => ExecutorKind::Branching,
            NodeType::Loop => ExecutorKind::ScatterGather,
            _ => ExecutorKind::SingleOutput,
        }
    }

    pub fn is_branching(&self) -> bool {
        self.executor_kind() == ExecutorKind::Branching
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ================================
// Flow document
// ================================

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// A step as stored in a flow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSchema {
    pub key: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default = "empty_object")]
    pub config: Value,
}

impl StepSchema {
    pub fn new(key: impl Into<String>, node_type: NodeType, config: Value) -> Self {
        Self {
            key: key.into(),
            node_type,
            config,
        }
    }
}

/// A directed connection between two steps. `source_handle` selects one
/// branch of a branching source; `target_handle` names the input slot of a
/// multi-input target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSchema {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(
        default,
        alias = "source_handle",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    #[serde(
        default,
        alias = "target_handle",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_handle: Option<String>,
}

impl EdgeSchema {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: default_edge_id(&source, &target, None),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self.id = default_edge_id(&self.source, &self.target, self.source_handle.as_deref());
        self
    }

    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }
}

/// Id given to edges that arrive without one.
pub fn default_edge_id(source: &str, target: &str, source_handle: Option<&str>) -> String {
    match source_handle {
        Some(handle) => format!("{}:{}->{}", source, handle, target),
        None => format!("{}->{}", source, target),
    }
}

/// Per-step index of tokens: step key → config path → tokens.
pub type TokenMappings = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Importable/exportable flow. `mappings` is informational and ignored on
/// import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    pub steps: Vec<StepSchema>,
    #[serde(default)]
    pub edges: Vec<EdgeSchema>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mappings: TokenMappings,
}
