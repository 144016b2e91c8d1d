//! Static checks over a flow document.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::schema::{FlowDocument, NodeType};
use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::FlowGraph;
use crate::template::referenced_steps;

/// Severity level of a validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// A single validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
    pub step_key: Option<String>,
    pub edge_id: Option<String>,
}

impl Diagnostic {
    fn error(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            code: code.to_string(),
            message: message.into(),
            step_key: None,
            edge_id: None,
        }
    }

    fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            ..Self::error(code, message)
        }
    }

    fn on_step(mut self, key: &str) -> Self {
        self.step_key = Some(key.to_string());
        self
    }

    fn on_edge(mut self, id: &str) -> Self {
        self.edge_id = Some(id.to_string());
        self
    }
}

/// Aggregated result of flow validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    fn from_diagnostics(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            is_valid: !diagnostics
                .iter()
                .any(|d| d.level == DiagnosticLevel::Error),
            diagnostics,
        }
    }

    /// Return only the error-level diagnostics.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .collect()
    }

    /// Return only the warning-level diagnostics.
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .collect()
    }

    pub fn into_result(self) -> WorkflowResult<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(WorkflowError::ValidationFailed(Box::new(self)))
        }
    }
}

/// Branch labels a branching step can produce, from its config.
pub fn declared_branch_labels(node_type: NodeType, config: &serde_json::Value) -> Vec<String> {
    match node_type {
        NodeType::If => vec!["TRUE".to_string(), "FALSE".to_string()],
        NodeType::Switch => {
            let rules = config
                .get("rules")
                .and_then(|r| r.as_array())
                .map(Vec::len)
                .unwrap_or(0);
            (0..rules)
                .map(|i| format!("case_{}", i))
                .chain(std::iter::once("default".to_string()))
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Check a flow document.
///
/// Errors: empty or duplicate step keys, duplicate edge ids, edges to unknown
/// steps, cycles. Warnings: tokens naming unknown or non-upstream steps,
/// branch handles that do not exist, loops without a body, join merges
/// without two inputs.
pub fn validate_flow(doc: &FlowDocument) -> ValidationReport {
    let mut diagnostics = Vec::new();

    let mut keys = HashSet::new();
    for step in &doc.steps {
        if step.key.trim().is_empty() {
            diagnostics.push(Diagnostic::error("E001", "Step key must not be empty"));
        } else if !keys.insert(step.key.as_str()) {
            diagnostics.push(
                Diagnostic::error("E002", format!("Duplicate step key: {}", step.key))
                    .on_step(&step.key),
            );
        }
    }

    let mut edge_ids = HashSet::new();
    let mut edges_ok = true;
    for edge in &doc.edges {
        if !edge_ids.insert(edge.id.as_str()) {
            diagnostics.push(
                Diagnostic::error("E003", format!("Duplicate edge id: {}", edge.id))
                    .on_edge(&edge.id),
            );
        }
        for (role, key) in [("source", &edge.source), ("target", &edge.target)] {
            if !keys.contains(key.as_str()) {
                edges_ok = false;
                diagnostics.push(
                    Diagnostic::error("E004", format!("Edge {} not found: {}", role, key))
                        .on_edge(&edge.id),
                );
            }
        }
    }

    let graph = if edges_ok {
        FlowGraph::build(&doc.steps, &doc.edges).ok()
    } else {
        None
    };

    if let Some(graph) = &graph {
        if let Err(WorkflowError::CycleDetected(at)) = graph.topological_order() {
            diagnostics.push(
                Diagnostic::error("E005", format!("Cycle detected at step: {}", at)).on_step(&at),
            );
        }
    }

    let types: HashMap<&str, (NodeType, &serde_json::Value)> = doc
        .steps
        .iter()
        .map(|s| (s.key.as_str(), (s.node_type, &s.config)))
        .collect();

    for step in &doc.steps {
        let ancestors = graph
            .as_ref()
            .filter(|g| !g.has_cycle())
            .and_then(|g| g.ancestors(&step.key).ok());
        for referenced in referenced_steps(&step.config) {
            let base = base_step_key(&referenced, &types);
            match base {
                None => diagnostics.push(
                    Diagnostic::warning(
                        "W001",
                        format!("Token references unknown step: {}", referenced),
                    )
                    .on_step(&step.key),
                ),
                Some(base) => {
                    if let Some(ancestors) = &ancestors {
                        if base != step.key && !ancestors.contains(base) {
                            diagnostics.push(
                                Diagnostic::warning(
                                    "W002",
                                    format!(
                                        "Token references step {} which is not upstream",
                                        referenced
                                    ),
                                )
                                .on_step(&step.key),
                            );
                        }
                    }
                }
            }
        }
    }

    for edge in &doc.edges {
        let Some(handle) = &edge.source_handle else {
            continue;
        };
        let Some((node_type, config)) = types.get(edge.source.as_str()) else {
            continue;
        };
        let labels = declared_branch_labels(*node_type, config);
        if !labels.iter().any(|l| l == handle) {
            diagnostics.push(
                Diagnostic::warning(
                    "W003",
                    format!("Source {} has no branch named {}", edge.source, handle),
                )
                .on_edge(&edge.id),
            );
        }
    }

    if let Some(graph) = &graph {
        for step in &doc.steps {
            match step.node_type {
                NodeType::Loop => {
                    if graph.outgoing_edges(&step.key).map_or(true, |e| e.is_empty()) {
                        diagnostics.push(
                            Diagnostic::warning("W004", "Loop has no downstream step to run per item")
                                .on_step(&step.key),
                        );
                    }
                }
                NodeType::Merge => {
                    let is_join = step.config.get("mode").and_then(|m| m.as_str()) == Some("join");
                    let inputs = graph.incoming_edges(&step.key).map_or(0, |e| e.len());
                    if is_join && inputs != 2 {
                        diagnostics.push(
                            Diagnostic::warning(
                                "W005",
                                format!("Join merge needs exactly 2 inputs, has {}", inputs),
                            )
                            .on_step(&step.key),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    ValidationReport::from_diagnostics(diagnostics)
}

/// Map an output key (`step` or `step-label`) back to its step key.
fn base_step_key<'a>(
    output_key: &'a str,
    types: &HashMap<&'a str, (NodeType, &serde_json::Value)>,
) -> Option<&'a str> {
    if types.contains_key(output_key) {
        return Some(output_key);
    }
    let (base, label) = output_key.rsplit_once('-')?;
    let (node_type, config) = types.get(base)?;
    declared_branch_labels(*node_type, config)
        .iter()
        .any(|l| l == label)
        .then_some(base)
}
