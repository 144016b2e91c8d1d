use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::core::runtime_context::RuntimeContext;
use crate::core::state::StepOutputs;
use crate::dsl::NodeType;
use crate::error::NodeResult;
use crate::template::TokenContext;

/// One labelled output of a branching node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchOutput {
    pub label: String,
    pub data: Value,
}

impl BranchOutput {
    pub fn new(label: impl Into<String>, data: Value) -> Self {
        Self {
            label: label.into(),
            data,
        }
    }
}

/// What a node produced: a single value, or one value per branch.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Plain(Value),
    Branches(Vec<BranchOutput>),
}

impl NodeOutput {
    /// Flatten to JSON. Branches become a `{label: data}` object.
    pub fn to_value(&self) -> Value {
        match self {
            NodeOutput::Plain(value) => value.clone(),
            NodeOutput::Branches(branches) => Value::Object(
                branches
                    .iter()
                    .map(|b| (b.label.clone(), b.data.clone()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    pub fn branch(&self, label: &str) -> Option<&Value> {
        match self {
            NodeOutput::Branches(branches) => {
                branches.iter().find(|b| b.label == label).map(|b| &b.data)
            }
            NodeOutput::Plain(_) => None,
        }
    }

    pub fn is_branches(&self) -> bool {
        matches!(self, NodeOutput::Branches(_))
    }
}

/// One input of a multi-input node, keyed by the edge's target handle.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleInput {
    pub handle: String,
    pub source: String,
    pub source_type: NodeType,
    pub data: Value,
}

/// Everything a node contract sees when it runs.
#[derive(Clone, Copy)]
pub struct NodeRunArgs<'a> {
    pub step_key: &'a str,
    /// Raw config, tokens intact.
    pub config: &'a Value,
    /// Config with tokens substituted.
    pub resolved_config: &'a Value,
    pub previous_output: Option<&'a Value>,
    pub previous_node_type: Option<NodeType>,
    pub previous_step_key: Option<&'a str>,
    pub step_outputs: &'a StepOutputs,
    pub tokens: &'a TokenContext,
    pub inputs_by_handle: &'a [HandleInput],
    pub context: &'a RuntimeContext,
}

/// Result of a node contract.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRunResult {
    pub output: NodeOutput,
    /// HTTP status, for http nodes.
    pub status: Option<u16>,
    pub duration_ms: Option<u64>,
    pub request_preview: Option<Value>,
    pub metadata: Option<Value>,
}

impl NodeRunResult {
    pub fn plain(value: Value) -> Self {
        Self::from_output(NodeOutput::Plain(value))
    }

    pub fn branches(branches: Vec<BranchOutput>) -> Self {
        Self::from_output(NodeOutput::Branches(branches))
    }

    pub fn from_output(output: NodeOutput) -> Self {
        Self {
            output,
            status: None,
            duration_ms: None,
            request_preview: None,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_request_preview(mut self, preview: Value) -> Self {
        self.request_preview = Some(preview);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Trait for node execution. Each node type implements this.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Run the node once.
    async fn run(&self, args: NodeRunArgs<'_>) -> NodeResult<NodeRunResult>;
}

/// Registry of node executors by node type
pub struct NodeExecutorRegistry {
    executors: HashMap<NodeType, Box<dyn NodeExecutor>>,
}

impl NodeExecutorRegistry {
    /// Registry with every built-in node type.
    pub fn new() -> Self {
        use super::{control_flow, flow, list, transform};

        let mut registry = Self::empty();
        registry.register(NodeType::Manual, Box::new(transform::ManualNodeExecutor));
        registry.register(NodeType::Http, Box::new(transform::HttpNodeExecutor));
        registry.register(NodeType::Set, Box::new(transform::SetNodeExecutor));
        registry.register(NodeType::Split, Box::new(transform::SplitNodeExecutor));
        registry.register(NodeType::Code, Box::new(transform::CodeNodeExecutor));
        registry.register(NodeType::Wait, Box::new(transform::WaitNodeExecutor));
        registry.register(NodeType::Sort, Box::new(list::SortNodeExecutor));
        registry.register(NodeType::Limit, Box::new(list::LimitNodeExecutor));
        registry.register(NodeType::Aggregate, Box::new(list::AggregateNodeExecutor));
        registry.register(NodeType::Filter, Box::new(control_flow::FilterNodeExecutor));
        registry.register(NodeType::If, Box::new(control_flow::IfNodeExecutor));
        registry.register(NodeType::Switch, Box::new(control_flow::SwitchNodeExecutor));
        registry.register(NodeType::Merge, Box::new(flow::MergeNodeExecutor));
        registry.register(NodeType::Loop, Box::new(flow::LoopNodeExecutor));
        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    pub fn register(&mut self, node_type: NodeType, executor: Box<dyn NodeExecutor>) {
        self.executors.insert(node_type, executor);
    }

    pub fn get(&self, node_type: NodeType) -> Option<&dyn NodeExecutor> {
        self.executors.get(&node_type).map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

impl Default for NodeExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
