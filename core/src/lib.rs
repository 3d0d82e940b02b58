//! ADW Orchestrator core: the stage-sequencing engine, SQLite-backed state
//! store, discovery layer, worktree manager, process runner, git adapter,
//! and configuration loader.
//!
//! This crate never installs a global tracing subscriber itself -- only
//! binary entry points (the CLI, the daemon) do that, so embedding this
//! crate in another program doesn't fight over the global logger.

pub mod config_loader;
pub mod discovery;
pub mod errors;
pub mod git_adapter;
pub mod models;
pub mod orchestrator;
pub mod process_runner;
pub mod stages;
pub mod state_store;
pub mod traits;
pub mod worktree;

pub use errors::{
    ApiError, ApiResult, ConfigError, ConfigResult, GitError, GitResult, ProcessError,
    ProcessResult, StageError, StageResult as StageErrResult, StateStoreError, StateStoreResult,
    WorktreeError, WorktreeInvalidReason, WorktreeResult,
};

pub use models::{
    ADWState, ADWStateSummary, ActivityLogEntry, DataSource, IssueClass, StageContext,
    StageExecution, StageOutcome, StageStatus, WorkflowExecution, WorkflowStatus, TERMINAL_STAGES,
    VALID_STAGES,
};

pub use traits::{Stage, StateStore};

pub use state_store::SqliteStateStore;

pub use discovery::{AdwSummary, Discovery};

pub use worktree::{PortAllocation, WorktreeManager};

pub use process_runner::{LineSource, ProcessOutput, ProcessRunner, ProcessRunnerConfig};

pub use git_adapter::GitAdapter;

pub use config_loader::{ConfigLoader, OrchestratorConfig, StageConfigEntry, WorkflowConfig};

pub use stages::registry::StageRegistry;

pub use orchestrator::{EventEmitter, NullEventEmitter, Orchestrator, OrchestratorEvent, OrchestratorEventKind};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
