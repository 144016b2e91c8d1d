pub mod dispatcher;
pub mod executors;
pub mod http_client;
pub mod runtime_context;
pub mod state;

pub use dispatcher::{EngineConfig, FlowRunSummary, OrderingMode, StepDispatcher};
pub use executors::{ExecutorKind, LoopPlan, ScatterTarget, StepEffect};
pub use http_client::{HttpClientProvider, HttpPoolConfig};
pub use runtime_context::{
    FakeIdGenerator, FakeTimeProvider, IdGenerator, RealIdGenerator, RealTimeProvider,
    RuntimeContext, TimeProvider,
};
pub use state::{
    branch_output_key, Command, RunRecord, RunState, RunStatus, StepOutputs, TimelineEntry,
    WorkflowState,
};
