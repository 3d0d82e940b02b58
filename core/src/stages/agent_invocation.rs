//! Shared helper every stage uses to spawn the external agent CLI inside
//! its worktree and capture its output.

use crate::errors::StageError;
use crate::process_runner::{ProcessOutput, ProcessRunner, ProcessRunnerConfig};
use std::path::Path;

/// Binary name/path for the agent CLI, overridable via `CLAUDE_CODE_PATH`.
pub fn agent_binary() -> String {
    std::env::var("CLAUDE_CODE_PATH").unwrap_or_else(|_| "claude".to_string())
}

/// Invokes the agent with `prompt` inside `worktree_path`, using the
/// default [`ProcessRunnerConfig`] (600s timeout, `ANTHROPIC_API_KEY`
/// scrubbed). The agent's own JSONL log directory is the caller's concern
/// (the agent log monitor tails it separately); this just runs the process.
pub async fn invoke_agent(worktree_path: &Path, prompt: &str) -> Result<ProcessOutput, StageError> {
    let runner = ProcessRunner::new(ProcessRunnerConfig::default());
    let binary = agent_binary();
    let args = vec!["--print".to_string(), prompt.to_string()];

    runner
        .run(&binary, &args, worktree_path, None)
        .await
        .map_err(StageError::from)
}
