use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::dsl::{EdgeSchema, StepSchema};
use crate::error::{WorkflowError, WorkflowResult};

use super::types::*;

/// Read-only graph view over a flow's steps and edges.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    graph: StableDiGraph<GraphNode, GraphEdge>,
    node_index_map: NodeIndexMap,
}

impl FlowGraph {
    /// Build the graph. Every edge endpoint must name an existing step.
    pub fn build(steps: &[StepSchema], edges: &[EdgeSchema]) -> WorkflowResult<Self> {
        let mut graph = StableDiGraph::<GraphNode, GraphEdge>::new();
        let mut node_index_map: NodeIndexMap = HashMap::new();

        for (position, step) in steps.iter().enumerate() {
            let idx = graph.add_node(GraphNode {
                key: step.key.clone(),
                node_type: step.node_type,
                position,
            });
            node_index_map.insert(step.key.clone(), idx);
        }

        for edge in edges {
            let source_idx = node_index_map.get(&edge.source).ok_or_else(|| {
                WorkflowError::StepNotFound(format!(
                    "{} (source of edge {})",
                    edge.source, edge.id
                ))
            })?;
            let target_idx = node_index_map.get(&edge.target).ok_or_else(|| {
                WorkflowError::StepNotFound(format!(
                    "{} (target of edge {})",
                    edge.target, edge.id
                ))
            })?;
            graph.add_edge(
                *source_idx,
                *target_idx,
                GraphEdge {
                    id: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    source_handle: edge.source_handle.clone(),
                    target_handle: edge.target_handle.clone(),
                },
            );
        }

        Ok(Self {
            graph,
            node_index_map,
        })
    }

    fn index_of(&self, key: &str) -> WorkflowResult<NodeIndex> {
        self.node_index_map
            .get(key)
            .copied()
            .ok_or_else(|| WorkflowError::StepNotFound(key.to_string()))
    }

    fn key_of(&self, idx: NodeIndex) -> Option<&str> {
        self.graph.node_weight(idx).map(|n| n.key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.node_index_map.contains_key(key)
    }

    pub fn node(&self, key: &str) -> WorkflowResult<&GraphNode> {
        let idx = self.index_of(key)?;
        self.graph
            .node_weight(idx)
            .ok_or_else(|| WorkflowError::StepNotFound(key.to_string()))
    }

    /// Edges in insertion order.
    fn edges_sorted(&self, key: &str, direction: Direction) -> WorkflowResult<Vec<&GraphEdge>> {
        let idx = self.index_of(key)?;
        let mut edges: Vec<(EdgeIndex, &GraphEdge)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| (e.id(), e.weight()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        Ok(edges.into_iter().map(|(_, e)| e).collect())
    }

    /// Incoming edges of a step, in the order they were declared.
    pub fn incoming_edges(&self, key: &str) -> WorkflowResult<Vec<&GraphEdge>> {
        self.edges_sorted(key, Direction::Incoming)
    }

    /// Outgoing edges of a step, in the order they were declared.
    pub fn outgoing_edges(&self, key: &str) -> WorkflowResult<Vec<&GraphEdge>> {
        self.edges_sorted(key, Direction::Outgoing)
    }

    pub fn first_incoming_edge(&self, key: &str) -> WorkflowResult<Option<&GraphEdge>> {
        Ok(self.incoming_edges(key)?.into_iter().next())
    }

    pub fn first_outgoing_edge(&self, key: &str) -> WorkflowResult<Option<&GraphEdge>> {
        Ok(self.outgoing_edges(key)?.into_iter().next())
    }

    /// Every step with a path to `key`.
    pub fn ancestors(&self, key: &str) -> WorkflowResult<HashSet<String>> {
        let start = self.index_of(key)?;
        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for pred in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if pred != start && seen.insert(pred) {
                    queue.push_back(pred);
                }
            }
        }
        Ok(seen
            .into_iter()
            .filter_map(|idx| self.key_of(idx).map(str::to_string))
            .collect())
    }

    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Topological order of all steps. Ties follow step list position, so a
    /// list that is already ordered comes back unchanged.
    pub fn topological_order(&self) -> WorkflowResult<Vec<String>> {
        let all: HashSet<NodeIndex> = self.graph.node_indices().collect();
        self.sorted_subset(&all)
    }

    /// Ancestors of `key` in topological order.
    ///
    /// Only the subgraph made of `key` and its ancestors is sorted, so a cycle
    /// elsewhere in the flow does not block unrelated steps. A step that can
    /// reach itself fails with `CycleDetected`.
    pub fn dependencies(&self, key: &str) -> WorkflowResult<Vec<String>> {
        let start = self.index_of(key)?;
        let mut subset: HashSet<NodeIndex> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(idx) = queue.pop_front() {
            for pred in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if pred == start {
                    return Err(WorkflowError::CycleDetected(key.to_string()));
                }
                if subset.insert(pred) {
                    queue.push_back(pred);
                }
            }
        }
        if subset.len() == 1 {
            return Ok(Vec::new());
        }
        let mut order = self.sorted_subset(&subset)?;
        order.retain(|k| k != key);
        Ok(order)
    }

    /// Kahn's algorithm restricted to `subset`, ties broken by list position.
    fn sorted_subset(&self, subset: &HashSet<NodeIndex>) -> WorkflowResult<Vec<String>> {
        let mut in_degree: HashMap<NodeIndex, usize> = subset
            .iter()
            .map(|idx| {
                let degree = self
                    .graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .filter(|pred| subset.contains(pred))
                    .count();
                (*idx, degree)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(usize, NodeIndex)>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .filter_map(|(idx, _)| self.position(*idx).map(|p| Reverse((p, *idx))))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse((_, idx))) = ready.pop() {
            if let Some(key) = self.key_of(idx) {
                order.push(key.to_string());
            }
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        if let Some(p) = self.position(target) {
                            ready.push(Reverse((p, target)));
                        }
                    }
                }
            }
        }

        if order.len() < subset.len() {
            let emitted: HashSet<&str> = order.iter().map(String::as_str).collect();
            let stuck = subset
                .iter()
                .filter_map(|idx| self.graph.node_weight(*idx))
                .filter(|n| !emitted.contains(n.key.as_str()))
                .min_by_key(|n| n.position)
                .map(|n| n.key.clone())
                .unwrap_or_default();
            return Err(WorkflowError::CycleDetected(stuck));
        }
        Ok(order)
    }

    fn position(&self, idx: NodeIndex) -> Option<usize> {
        self.graph.node_weight(idx).map(|n| n.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::NodeType;
    use serde_json::json;

    fn step(key: &str) -> StepSchema {
        StepSchema::new(key, NodeType::Manual, json!({}))
    }

    fn build(keys: &[&str], edges: &[(&str, &str)]) -> FlowGraph {
        let steps: Vec<_> = keys.iter().map(|k| step(k)).collect();
        let edges: Vec<_> = edges.iter().map(|(s, t)| EdgeSchema::new(*s, *t)).collect();
        FlowGraph::build(&steps, &edges).unwrap()
    }

    #[test]
    fn test_topological_order_follows_edges() {
        // listed out of order: c depends on b depends on a
        let g = build(&["c", "b", "a"], &[("a", "b"), ("b", "c")]);
        assert_eq!(g.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_keep_list_order() {
        let g = build(&["x", "y", "z"], &[]);
        assert_eq!(g.topological_order().unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_dependencies_are_ancestors_only() {
        // a -> b -> d, c unrelated
        let g = build(&["a", "b", "c", "d"], &[("a", "b"), ("b", "d")]);
        assert_eq!(g.dependencies("d").unwrap(), vec!["a", "b"]);
        assert!(g.dependencies("a").unwrap().is_empty());
        assert!(g.dependencies("c").unwrap().is_empty());
    }

    #[test]
    fn test_diamond_dependencies() {
        let g = build(
            &["src", "left", "right", "join"],
            &[("src", "left"), ("src", "right"), ("left", "join"), ("right", "join")],
        );
        assert_eq!(g.dependencies("join").unwrap(), vec!["src", "left", "right"]);
    }

    #[test]
    fn test_cycle_detected() {
        let g = build(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        assert!(g.has_cycle());
        let err = g.topological_order().unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(ref k) if k == "b"));
    }

    #[test]
    fn test_cycle_elsewhere_does_not_block_dependencies() {
        // x -> y -> x is a cycle, a -> b is fine
        let g = build(&["a", "b", "x", "y"], &[("a", "b"), ("x", "y"), ("y", "x")]);
        assert_eq!(g.dependencies("b").unwrap(), vec!["a"]);
        assert!(matches!(
            g.dependencies("x"),
            Err(WorkflowError::CycleDetected(ref k)) if k == "x"
        ));
    }

    #[test]
    fn test_cycle_upstream_of_step() {
        // p <-> q both feed r; r itself is not on the cycle
        let g = build(&["p", "q", "r"], &[("p", "q"), ("q", "p"), ("q", "r")]);
        assert!(matches!(
            g.dependencies("r"),
            Err(WorkflowError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_edges_in_declared_order() {
        let g = build(&["a", "b", "m"], &[("b", "m"), ("a", "m")]);
        let incoming: Vec<_> = g
            .incoming_edges("m")
            .unwrap()
            .iter()
            .map(|e| e.source.clone())
            .collect();
        assert_eq!(incoming, vec!["b", "a"]);
        assert_eq!(g.first_incoming_edge("m").unwrap().unwrap().source, "b");
        assert_eq!(g.first_outgoing_edge("a").unwrap().unwrap().target, "m");
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let err = FlowGraph::build(&[step("a")], &[EdgeSchema::new("a", "ghost")]).unwrap_err();
        assert!(matches!(err, WorkflowError::StepNotFound(_)));
    }
}
