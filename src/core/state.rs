//! Workflow state: steps, edges, outputs, run states and the run timeline.
//!
//! All mutation goes through [`WorkflowState::apply`] with a [`Command`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::dsl::{compute_mappings, default_edge_id, EdgeSchema, FlowDocument, StepSchema};
use crate::error::{ErrorContext, WorkflowError, WorkflowResult};
use crate::graph::FlowGraph;
use crate::nodes::executor::{BranchOutput, NodeOutput};
use crate::template::{parse_path, set_path, TokenContext};

// ================================
// Step outputs
// ================================

/// Output map keyed by output key: `step` for ordinary steps and
/// `step-label` for each branch of a branching step.
#[derive(Debug, Clone, Default)]
pub struct StepOutputs {
    entries: BTreeMap<String, Value>,
    branch_labels: HashMap<String, Vec<String>>,
}

/// Output key of one branch of a branching step.
pub fn branch_output_key(step_key: &str, label: &str) -> String {
    format!("{}-{}", step_key, label)
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, output_key: &str) -> Option<&Value> {
        self.entries.get(output_key)
    }

    pub fn set_plain(&mut self, step_key: &str, value: Value) {
        self.remove_branch_entries(step_key);
        self.entries.insert(step_key.to_string(), value);
    }

    pub fn set_branches(&mut self, step_key: &str, branches: Vec<BranchOutput>) {
        self.entries.remove(step_key);
        self.remove_branch_entries(step_key);
        let mut labels = Vec::with_capacity(branches.len());
        for branch in branches {
            self.entries
                .insert(branch_output_key(step_key, &branch.label), branch.data);
            labels.push(branch.label);
        }
        self.branch_labels.insert(step_key.to_string(), labels);
    }

    pub fn set(&mut self, step_key: &str, output: NodeOutput) {
        match output {
            NodeOutput::Plain(value) => self.set_plain(step_key, value),
            NodeOutput::Branches(branches) => self.set_branches(step_key, branches),
        }
    }

    fn remove_branch_entries(&mut self, step_key: &str) {
        if let Some(labels) = self.branch_labels.remove(step_key) {
            for label in labels {
                self.entries.remove(&branch_output_key(step_key, &label));
            }
        }
    }

    /// Drop everything stored for `step_key`. Only the branch labels recorded
    /// for that step are removed, so `a-b` survives when `a` is removed.
    pub fn remove_step(&mut self, step_key: &str) {
        self.entries.remove(step_key);
        self.remove_branch_entries(step_key);
    }

    pub fn output_of(&self, step_key: &str) -> Option<NodeOutput> {
        if let Some(labels) = self.branch_labels.get(step_key) {
            let branches = labels
                .iter()
                .map(|label| {
                    let data = self
                        .entries
                        .get(&branch_output_key(step_key, label))
                        .cloned()
                        .unwrap_or(Value::Null);
                    BranchOutput::new(label.clone(), data)
                })
                .collect();
            return Some(NodeOutput::Branches(branches));
        }
        self.entries.get(step_key).cloned().map(NodeOutput::Plain)
    }

    pub fn branch_labels(&self, step_key: &str) -> Option<&[String]> {
        self.branch_labels.get(step_key).map(Vec::as_slice)
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Token context for resolving a step config: `steps.<outputKey>` for
    /// every entry plus `steps.<step>` holding the `{label: data}` object of
    /// each branching step.
    pub fn token_context(&self) -> TokenContext {
        let mut ctx = TokenContext::new();
        for (key, value) in &self.entries {
            ctx.set_step(key, value.clone());
        }
        for step_key in self.branch_labels.keys() {
            if let Some(output) = self.output_of(step_key) {
                ctx.set_step(step_key, output.to_value());
            }
        }
        ctx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ================================
// Run state
// ================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// What happened the last time a step ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Resolved config the step ran with.
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorContext>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_preview: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RunRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub id: String,
    pub step_key: String,
    pub status: RunStatus,
    pub record: RunRecord,
}

// ================================
// Commands
// ================================

#[derive(Debug, Clone)]
pub enum Command {
    AddStep(StepSchema),
    UpdateStepConfig {
        key: String,
        config: Value,
    },
    /// Set one field inside a step config, e.g. `fields[0].value`.
    SetStepConfigField {
        key: String,
        path: String,
        value: Value,
    },
    RemoveStep {
        key: String,
    },
    AddEdge(EdgeSchema),
    RemoveEdge {
        id: String,
    },
    StepStarted {
        key: String,
    },
    StepSucceeded {
        key: String,
        output: NodeOutput,
        record: RunRecord,
        timeline_id: String,
    },
    StepFailed {
        key: String,
        record: RunRecord,
        timeline_id: String,
    },
    /// Every run state back to idle. Outputs and timeline are kept.
    ResetRuns,
    ImportFlow(FlowDocument),
}

// ================================
// Workflow state
// ================================

#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    steps: Vec<StepSchema>,
    edges: Vec<EdgeSchema>,
    outputs: StepOutputs,
    run_states: HashMap<String, RunState>,
    timeline: Vec<TimelineEntry>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: FlowDocument) -> WorkflowResult<Self> {
        let mut state = Self::new();
        state.apply(Command::ImportFlow(doc))?;
        Ok(state)
    }

    pub fn to_document(&self) -> FlowDocument {
        FlowDocument {
            steps: self.steps.clone(),
            edges: self.edges.clone(),
            mappings: compute_mappings(&self.steps),
        }
    }

    pub fn steps(&self) -> &[StepSchema] {
        &self.steps
    }

    pub fn step(&self, key: &str) -> Option<&StepSchema> {
        self.steps.iter().find(|s| s.key == key)
    }

    pub fn edges(&self) -> &[EdgeSchema] {
        &self.edges
    }

    pub fn outputs(&self) -> &StepOutputs {
        &self.outputs
    }

    /// Run state of a step; steps that never ran are idle.
    pub fn run_state(&self, key: &str) -> RunState {
        self.run_states.get(key).cloned().unwrap_or_default()
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn graph(&self) -> WorkflowResult<FlowGraph> {
        FlowGraph::build(&self.steps, &self.edges)
    }

    fn step_mut(&mut self, key: &str) -> WorkflowResult<&mut StepSchema> {
        self.steps
            .iter_mut()
            .find(|s| s.key == key)
            .ok_or_else(|| WorkflowError::StepNotFound(key.to_string()))
    }

    fn ensure_step(&self, key: &str) -> WorkflowResult<()> {
        if self.step(key).is_some() {
            Ok(())
        } else {
            Err(WorkflowError::StepNotFound(key.to_string()))
        }
    }

    pub fn apply(&mut self, command: Command) -> WorkflowResult<()> {
        match command {
            Command::AddStep(step) => {
                if self.step(&step.key).is_some() {
                    return Err(WorkflowError::DuplicateStep(step.key));
                }
                self.steps.push(step);
            }
            Command::UpdateStepConfig { key, config } => {
                self.step_mut(&key)?.config = config;
            }
            Command::SetStepConfigField { key, path, value } => {
                let segments = parse_path(&path);
                if segments.is_empty() {
                    return Err(WorkflowError::InvalidConfigPath(path));
                }
                let step = self.step_mut(&key)?;
                let mut config = step.config.clone();
                set_path(&mut config, &segments, value)?;
                step.config = config;
            }
            Command::RemoveStep { key } => {
                self.ensure_step(&key)?;
                self.steps.retain(|s| s.key != key);
                self.edges.retain(|e| e.source != key && e.target != key);
                self.outputs.remove_step(&key);
                self.run_states.remove(&key);
                self.timeline.retain(|t| t.step_key != key);
            }
            Command::AddEdge(mut edge) => {
                self.ensure_step(&edge.source)?;
                self.ensure_step(&edge.target)?;
                if edge.id.is_empty() {
                    edge.id =
                        default_edge_id(&edge.source, &edge.target, edge.source_handle.as_deref());
                }
                if self.edges.iter().any(|e| e.id == edge.id) {
                    return Err(WorkflowError::DuplicateEdge(edge.id));
                }
                self.edges.push(edge);
            }
            Command::RemoveEdge { id } => {
                let before = self.edges.len();
                self.edges.retain(|e| e.id != id);
                if self.edges.len() == before {
                    return Err(WorkflowError::EdgeNotFound(id));
                }
            }
            Command::StepStarted { key } => {
                self.ensure_step(&key)?;
                self.run_states.entry(key).or_default().status = RunStatus::Running;
            }
            Command::StepSucceeded {
                key,
                output,
                record,
                timeline_id,
            } => {
                self.ensure_step(&key)?;
                self.outputs.set(&key, output);
                self.finish(key, RunStatus::Success, record, timeline_id);
            }
            Command::StepFailed {
                key,
                record,
                timeline_id,
            } => {
                self.ensure_step(&key)?;
                self.finish(key, RunStatus::Error, record, timeline_id);
            }
            Command::ResetRuns => {
                self.run_states.clear();
            }
            Command::ImportFlow(doc) => {
                self.import(doc)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, key: String, status: RunStatus, record: RunRecord, timeline_id: String) {
        self.timeline.push(TimelineEntry {
            id: timeline_id,
            step_key: key.clone(),
            status,
            record: record.clone(),
        });
        self.run_states.insert(
            key,
            RunState {
                status,
                record: Some(record),
            },
        );
    }

    fn import(&mut self, doc: FlowDocument) -> WorkflowResult<()> {
        let mut keys = HashSet::new();
        for step in &doc.steps {
            if !keys.insert(step.key.as_str()) {
                return Err(WorkflowError::DuplicateStep(step.key.clone()));
            }
        }

        let mut edges = Vec::with_capacity(doc.edges.len());
        let mut edge_ids = HashSet::new();
        for mut edge in doc.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !keys.contains(endpoint.as_str()) {
                    return Err(WorkflowError::StepNotFound(endpoint.clone()));
                }
            }
            if edge.id.is_empty() {
                edge.id =
                    default_edge_id(&edge.source, &edge.target, edge.source_handle.as_deref());
            }
            if !edge_ids.insert(edge.id.clone()) {
                return Err(WorkflowError::DuplicateEdge(edge.id));
            }
            edges.push(edge);
        }

        *self = Self {
            steps: doc.steps,
            edges,
            ..Self::default()
        };
        Ok(())
    }
}
