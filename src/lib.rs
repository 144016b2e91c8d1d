//! # xflow: a step-graph workflow engine
//!
//! A flow is an ordered list of typed steps joined by edges. Each step's
//! config may reference upstream outputs with `{{steps.<key>.<path>}}`
//! tokens. Running a step first runs any dependency that has not succeeded,
//! resolves the step's tokens, invokes the node executor for its type and
//! records the output and a timeline entry.
//!
//! - **Tokens** ([`template`]): type-preserving resolution of pure tokens,
//!   string interpolation otherwise, plus loop variables `$item`, `$index`,
//!   `$total` and `$batchIndex`.
//! - **Conditions** ([`evaluator`]): typed filter conditions with lenient
//!   coercion, used by filter, if and switch steps.
//! - **Merge/join** ([`merge`]): append, key-wise merge and inner/left/outer
//!   joins over multiple inputs.
//! - **Nodes** ([`nodes`]): manual, http, set, split, sort, limit, aggregate,
//!   filter, if, switch, loop, merge, code and wait.
//! - **Execution** ([`core`]): owned [`WorkflowState`] mutated through
//!   [`Command`]s and a [`StepDispatcher`] that runs steps in dependency
//!   order, with branch outputs stored as `"<key>-<label>"`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xflow::{parse_flow, FlowFormat, RuntimeContext, StepDispatcher};
//!
//! #[tokio::main]
//! async fn main() {
//!     let json = std::fs::read_to_string("flow.json").unwrap();
//!     let doc = parse_flow(&json, FlowFormat::Json).unwrap();
//!     let mut dispatcher = StepDispatcher::from_document(doc, RuntimeContext::default()).unwrap();
//!     let summary = dispatcher.run_flow().await.unwrap();
//!     println!("{:?}", summary.executed);
//! }
//! ```

pub mod core;
pub mod dsl;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod merge;
pub mod nodes;
pub mod template;

pub use crate::core::{
    Command, EngineConfig, FakeIdGenerator, FakeTimeProvider, FlowRunSummary, HttpClientProvider,
    IdGenerator, OrderingMode, RealIdGenerator, RealTimeProvider, RunRecord, RunState, RunStatus,
    RuntimeContext, StepDispatcher, StepOutputs, TimeProvider, TimelineEntry, WorkflowState,
};
pub use crate::dsl::{
    export_flow, load_flow, parse_flow, validate_flow, EdgeSchema, FlowDocument, FlowFormat,
    NodeType, StepSchema, ValidationReport,
};
pub use crate::error::{ErrorCode, ErrorContext, NodeError, WorkflowError};
pub use crate::graph::FlowGraph;
pub use crate::nodes::{NodeExecutor, NodeExecutorRegistry, NodeOutput, NodeRunArgs, NodeRunResult};
pub use crate::template::{resolve, TokenContext};
