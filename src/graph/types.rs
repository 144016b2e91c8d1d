use petgraph::stable_graph::NodeIndex;

use crate::dsl::NodeType;

/// Graph node: one step.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Step key.
    pub key: String,

    pub node_type: NodeType,

    /// Position of the step in the flow's step list. Breaks ordering ties.
    pub position: usize,
}

/// Graph edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub id: String,

    pub source: String,

    pub target: String,

    /// Branch label selected on a branching source.
    pub source_handle: Option<String>,

    /// Input slot on a multi-input target.
    pub target_handle: Option<String>,
}

/// Step key to petgraph `NodeIndex`.
pub type NodeIndexMap = std::collections::HashMap<String, NodeIndex>;
