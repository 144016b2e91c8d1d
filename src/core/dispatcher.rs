//! Step dispatcher: the execution driver.
//!
//! The [`StepDispatcher`] owns the [`WorkflowState`], resolves each step's
//! dependencies, builds its token context, hands it to the strategy picked by
//! its [`ExecutorKind`] and writes the outcome back through state commands.
//! Steps run one at a time.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::core::executors::{self, ExecutorKind, ScatterTarget};
use crate::core::runtime_context::RuntimeContext;
use crate::core::state::{
    branch_output_key, Command, RunRecord, RunStatus, StepOutputs, WorkflowState,
};
use crate::dsl::{FlowDocument, NodeType};
use crate::error::{ErrorContext, NodeError, WorkflowError, WorkflowResult};
use crate::graph::{FlowGraph, GraphEdge};
use crate::nodes::executor::{HandleInput, NodeExecutorRegistry, NodeOutput, NodeRunArgs};
use crate::template::resolve;

/// How dependencies and flow order are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingMode {
    /// Graph ancestors in topological order. Cycles are reported.
    #[default]
    Topological,
    /// Every step listed earlier in the flow is a dependency.
    Array,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ordering: OrderingMode,
    /// Upper bound for a wait step.
    pub max_wait_secs: u64,
    pub http_timeout_secs: u64,
    pub http_max_response_bytes: usize,
    pub loop_max_items: usize,
    pub code_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            ordering: OrderingMode::Topological,
            max_wait_secs: 300,
            http_timeout_secs: 30,
            http_max_response_bytes: 10 * 1024 * 1024,
            loop_max_items: 10_000,
            code_timeout_secs: 5,
        }
    }
}

impl EngineConfig {
    /// Load from a `.toml` or `.json` file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::ConfigFileError(format!("{}: {}", path.display(), e)))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&content).map_err(|e| WorkflowError::ConfigFileError(e.to_string()))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| WorkflowError::ConfigFileError(e.to_string()))
        }
    }
}

/// Steps touched by one flow run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowRunSummary {
    pub executed: Vec<String>,
    /// Steps already run per item by an upstream loop.
    pub skipped: Vec<String>,
}

/// Drives step execution over a workflow state.
pub struct StepDispatcher {
    state: WorkflowState,
    registry: Arc<NodeExecutorRegistry>,
    context: RuntimeContext,
}

impl StepDispatcher {
    pub fn new(state: WorkflowState, registry: NodeExecutorRegistry, context: RuntimeContext) -> Self {
        Self {
            state,
            registry: Arc::new(registry),
            context,
        }
    }

    /// Dispatcher over an imported flow with every built-in node type.
    pub fn from_document(doc: FlowDocument, context: RuntimeContext) -> WorkflowResult<Self> {
        Ok(Self::new(
            WorkflowState::from_document(doc)?,
            NodeExecutorRegistry::new(),
            context,
        ))
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    /// Edit the flow between runs.
    pub fn apply(&mut self, command: Command) -> WorkflowResult<()> {
        self.state.apply(command)
    }

    fn ordering(&self) -> OrderingMode {
        self.context.config.ordering
    }

    /// Steps that must have succeeded before `key` runs, in run order.
    pub fn dependencies(&self, key: &str) -> WorkflowResult<Vec<String>> {
        match self.ordering() {
            OrderingMode::Topological => self.state.graph()?.dependencies(key),
            OrderingMode::Array => {
                let position = self
                    .state
                    .steps()
                    .iter()
                    .position(|s| s.key == key)
                    .ok_or_else(|| WorkflowError::StepNotFound(key.to_string()))?;
                Ok(self.state.steps()[..position]
                    .iter()
                    .map(|s| s.key.clone())
                    .collect())
            }
        }
    }

    /// Order in which a full flow run visits steps.
    pub fn execution_order(&self) -> WorkflowResult<Vec<String>> {
        match self.ordering() {
            OrderingMode::Topological => self.state.graph()?.topological_order(),
            OrderingMode::Array => Ok(self.state.steps().iter().map(|s| s.key.clone()).collect()),
        }
    }

    /// Run one step, first running every dependency that has not succeeded.
    /// A step that a loop dependency just ran per item is not run again.
    pub async fn run_step(&mut self, key: &str) -> WorkflowResult<()> {
        if self.state.step(key).is_none() {
            return Err(WorkflowError::StepNotFound(key.to_string()));
        }

        let mut gathered: HashSet<String> = HashSet::new();
        for dependency in self.dependencies(key)? {
            if self.state.run_state(&dependency).status == RunStatus::Success {
                continue;
            }
            match self.execute_step(&dependency).await {
                Ok(Some(target)) => {
                    gathered.insert(target);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(step = key, dependency = %dependency, "Dependency failed, step not run");
                    return Err(WorkflowError::DependencyFailed {
                        step: key.to_string(),
                        dependency,
                        message: e.to_string(),
                    });
                }
            }
        }

        if gathered.contains(key) {
            tracing::debug!(step = key, "Step already run per item by its loop");
            return Ok(());
        }
        self.execute_step(key).await.map(|_| ())
    }

    /// Run every step in execution order, stopping at the first failure.
    /// Run states are reset first; outputs from earlier runs stay visible
    /// until overwritten.
    pub async fn run_flow(&mut self) -> WorkflowResult<FlowRunSummary> {
        self.state.apply(Command::ResetRuns)?;
        let order = self.execution_order()?;
        tracing::info!(steps = order.len(), "Flow run started");

        let mut summary = FlowRunSummary::default();
        let mut gathered: HashSet<String> = HashSet::new();
        for key in order {
            if gathered.contains(&key) {
                tracing::debug!(step = %key, "Skipping step already run by loop");
                summary.skipped.push(key);
                continue;
            }
            if let Some(target) = self.execute_step(&key).await? {
                gathered.insert(target);
            }
            summary.executed.push(key);
        }

        tracing::info!(
            executed = summary.executed.len(),
            skipped = summary.skipped.len(),
            "Flow run finished"
        );
        Ok(summary)
    }

    /// Run one step without looking at its dependencies. Returns the key of
    /// the downstream step a loop ran per item, if any.
    async fn execute_step(&mut self, key: &str) -> WorkflowResult<Option<String>> {
        let step = self
            .state
            .step(key)
            .cloned()
            .ok_or_else(|| WorkflowError::StepNotFound(key.to_string()))?;
        let graph = self.state.graph()?;
        let registry = Arc::clone(&self.registry);
        let executor = registry
            .get(step.node_type)
            .ok_or_else(|| WorkflowError::ExecutorNotFound(step.node_type.to_string()))?;
        let kind = step.node_type.executor_kind();

        let target_key = match kind {
            ExecutorKind::ScatterGather => graph
                .first_outgoing_edge(key)?
                .map(|edge| edge.target.clone()),
            _ => None,
        };
        if let Some(target_key) = &target_key {
            let target = self
                .state
                .step(target_key)
                .ok_or_else(|| WorkflowError::StepNotFound(target_key.clone()))?;
            if registry.get(target.node_type).is_none() {
                return Err(WorkflowError::ExecutorNotFound(target.node_type.to_string()));
            }
        }

        self.state.apply(Command::StepStarted {
            key: key.to_string(),
        })?;
        tracing::info!(step = key, node_type = %step.node_type, "Step started");

        let target = target_key
            .as_deref()
            .and_then(|target_key| self.scatter_target(&registry, target_key));

        let outputs = self.state.outputs();
        let tokens = outputs.token_context();
        let resolved = resolve(&step.config, &tokens);

        let first_incoming = graph.first_incoming_edge(key)?;
        let previous_output = first_incoming.and_then(|edge| edge_data(outputs, edge));
        let previous_node_type = first_incoming
            .and_then(|edge| graph.node(&edge.source).ok())
            .map(|node| node.node_type);
        let previous_step_key = first_incoming.map(|edge| edge.source.as_str());
        let inputs_by_handle = handle_inputs(&graph, outputs, key)?;

        let args = NodeRunArgs {
            step_key: key,
            config: &step.config,
            resolved_config: &resolved,
            previous_output: previous_output.as_ref(),
            previous_node_type,
            previous_step_key,
            step_outputs: outputs,
            tokens: &tokens,
            inputs_by_handle: &inputs_by_handle,
            context: &self.context,
        };

        let started = Instant::now();
        let outcome = executors::execute(kind, executor, args, target).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let timestamp = self.context.time_provider.now();

        match outcome {
            Ok(effect) => {
                let result = effect.result;
                let duration_ms = result.duration_ms.unwrap_or(elapsed_ms);
                let record = RunRecord {
                    input: resolved,
                    output: Some(result.output.to_value()),
                    error: None,
                    duration_ms,
                    timestamp,
                    status: result.status,
                    request_preview: result.request_preview,
                    metadata: result.metadata,
                };
                self.state.apply(Command::StepSucceeded {
                    key: key.to_string(),
                    output: result.output,
                    record,
                    timeline_id: self.context.id_generator.next_id(),
                })?;
                tracing::info!(step = key, duration_ms, "Step succeeded");

                let Some(gathered) = effect.gathered else {
                    return Ok(None);
                };
                let results = Value::Array(gathered.results);
                let record = RunRecord {
                    input: gathered.input,
                    output: Some(results.clone()),
                    error: None,
                    duration_ms: gathered.duration_ms,
                    timestamp,
                    status: None,
                    request_preview: None,
                    metadata: None,
                };
                self.state.apply(Command::StepSucceeded {
                    key: gathered.target_key.clone(),
                    output: NodeOutput::Plain(results),
                    record,
                    timeline_id: self.context.id_generator.next_id(),
                })?;
                tracing::info!(step = %gathered.target_key, via = key, "Step run per loop item");
                Ok(Some(gathered.target_key))
            }
            Err(e) => {
                tracing::error!(step = key, error = %e, "Step failed");
                let record = RunRecord {
                    input: resolved,
                    output: None,
                    error: Some(ErrorContext::from(&e)),
                    duration_ms: elapsed_ms,
                    timestamp,
                    status: match &e {
                        NodeError::HttpStatus { status, .. } => Some(*status),
                        _ => None,
                    },
                    request_preview: None,
                    metadata: None,
                };
                self.state.apply(Command::StepFailed {
                    key: key.to_string(),
                    record,
                    timeline_id: self.context.id_generator.next_id(),
                })?;
                Err(WorkflowError::StepFailed {
                    step: key.to_string(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Downstream step a loop runs per item.
    fn scatter_target<'a>(
        &'a self,
        registry: &'a NodeExecutorRegistry,
        key: &str,
    ) -> Option<ScatterTarget<'a>> {
        let step = self.state.step(key)?;
        let executor = registry.get(step.node_type)?;
        Some(ScatterTarget {
            key: &step.key,
            node_type: step.node_type,
            config: &step.config,
            executor,
        })
    }
}

/// Data carried by an edge: the selected branch when the edge names a source
/// handle, otherwise the source's whole output.
fn edge_data(outputs: &StepOutputs, edge: &GraphEdge) -> Option<Value> {
    match &edge.source_handle {
        Some(handle) => outputs.get(&branch_output_key(&edge.source, handle)).cloned(),
        None => outputs.output_of(&edge.source).map(|o| o.to_value()),
    }
}

fn handle_inputs(
    graph: &FlowGraph,
    outputs: &StepOutputs,
    key: &str,
) -> WorkflowResult<Vec<HandleInput>> {
    let mut inputs = Vec::new();
    for (i, edge) in graph.incoming_edges(key)?.into_iter().enumerate() {
        let Some(data) = edge_data(outputs, edge) else {
            continue;
        };
        let source_type = graph
            .node(&edge.source)
            .map(|n| n.node_type)
            .unwrap_or(NodeType::Manual);
        inputs.push(HandleInput {
            handle: edge
                .target_handle
                .clone()
                .unwrap_or_else(|| format!("input_{}", i)),
            source: edge.source.clone(),
            source_type,
            data,
        });
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::runtime_context::{FakeIdGenerator, FakeTimeProvider};
    use crate::dsl::{parse_flow, FlowFormat};
    use serde_json::json;

    fn dispatcher(json: &str, config: EngineConfig) -> StepDispatcher {
        let doc = parse_flow(json, FlowFormat::Json).unwrap();
        let context = RuntimeContext::new(config)
            .with_time_provider(Arc::new(FakeTimeProvider::new(1_700_000_000)))
            .with_id_generator(Arc::new(FakeIdGenerator::new("run".into())));
        StepDispatcher::from_document(doc, context).unwrap()
    }

    const LINEAR: &str = r#"{
        "steps": [
            {"key": "src", "type": "manual", "config": {"data": [{"n": 3}, {"n": 1}, {"n": 2}]}},
            {"key": "sorted", "type": "sort", "config": {"field": "n"}},
            {"key": "top", "type": "limit", "config": {"limit": 2}}
        ],
        "edges": [
            {"source": "src", "target": "sorted"},
            {"source": "sorted", "target": "top"}
        ]
    }"#;

    #[tokio::test]
    async fn test_run_step_runs_dependencies() {
        let mut d = dispatcher(LINEAR, EngineConfig::default());
        d.run_step("top").await.unwrap();
        assert_eq!(
            d.state().outputs().get("top"),
            Some(&json!([{"n": 1}, {"n": 2}]))
        );
        assert_eq!(d.state().run_state("src").status, RunStatus::Success);
        let ids: Vec<_> = d.state().timeline().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["run-0", "run-1", "run-2"]);
    }

    #[tokio::test]
    async fn test_successful_dependencies_not_rerun() {
        let mut d = dispatcher(LINEAR, EngineConfig::default());
        d.run_step("sorted").await.unwrap();
        d.run_step("top").await.unwrap();
        assert_eq!(d.state().timeline().len(), 3);
    }

    #[tokio::test]
    async fn test_array_ordering_runs_every_earlier_step() {
        let flow = r#"{
            "steps": [
                {"key": "a", "type": "manual", "config": {"data": 1}},
                {"key": "b", "type": "manual", "config": {"data": 2}},
                {"key": "c", "type": "manual", "config": {"data": 3}}
            ]
        }"#;
        let mut d = dispatcher(
            flow,
            EngineConfig {
                ordering: OrderingMode::Array,
                ..EngineConfig::default()
            },
        );
        d.run_step("c").await.unwrap();
        assert_eq!(d.state().run_state("a").status, RunStatus::Success);

        let mut d = dispatcher(flow, EngineConfig::default());
        d.run_step("c").await.unwrap();
        assert_eq!(d.state().run_state("a").status, RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_record_uses_injected_clock() {
        let mut d = dispatcher(LINEAR, EngineConfig::default());
        d.run_step("src").await.unwrap();
        let record = d.state().run_state("src").record.unwrap();
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(record.input, json!({"data": [{"n": 3}, {"n": 1}, {"n": 2}]}));
    }

    #[test]
    fn test_engine_config_from_toml() {
        let dir = std::env::temp_dir().join(format!("xflow-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");
        std::fs::write(&path, "ordering = \"array\"\nmax_wait_secs = 2\n").unwrap();
        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.ordering, OrderingMode::Array);
        assert_eq!(config.max_wait_secs, 2);
        assert_eq!(config.http_timeout_secs, 30);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_engine_config_bad_file() {
        let err = EngineConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, WorkflowError::ConfigFileError(_)));
    }
}
