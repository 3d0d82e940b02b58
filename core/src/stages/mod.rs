//! Per-stage `preconditions` / `should_skip` / `execute` contracts for the
//! six SDLC stages, plus the compile-time registry that instantiates them
//! by name.

pub mod agent_invocation;
pub mod build;
pub mod document;
pub mod merge;
pub mod plan;
pub mod registry;
pub mod review;
pub mod test_stage;

pub use agent_invocation::invoke_agent;
pub use build::BuildStage;
pub use document::DocumentStage;
pub use merge::MergeStage;
pub use plan::PlanStage;
pub use registry::StageRegistry;
pub use review::ReviewStage;
pub use test_stage::TestStage;
