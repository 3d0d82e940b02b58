//! The `merge` stage: depends on `build`. Requires a branch name and
//! worktree. Merges into `main` with the configured strategy; on
//! conflict, spawns the agent to resolve once and re-checks before
//! giving up; runs validation tests, pushes, and cleans up the worktree
//! and remote branch.

use crate::errors::{GitError, StageError};
use crate::git_adapter::{GitAdapter, MergeStrategy};
use crate::models::{StageContext, StageOutcome};
use crate::process_runner::{ProcessRunner, ProcessRunnerConfig};
use crate::stages::agent_invocation::invoke_agent;
use crate::traits::Stage;
use crate::worktree::WorktreeManager;
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, warn};

pub struct MergeStage;

impl MergeStage {
    fn strategy_from_config(ctx: &StageContext) -> MergeStrategy {
        match ctx.config.get("strategy").and_then(|v| v.as_str()) {
            Some("merge") => MergeStrategy::Merge,
            Some("rebase") => MergeStrategy::Rebase,
            _ => MergeStrategy::Squash,
        }
    }

    async fn run_validation_tests(worktree_path: &Path) -> bool {
        let runner = ProcessRunner::new(ProcessRunnerConfig::default());
        match runner.run("cargo", &["test".to_string()], worktree_path, None).await {
            Ok(output) => output.success,
            Err(e) => {
                warn!(error = %e, "validation test run failed to execute");
                false
            }
        }
    }
}

#[async_trait]
impl Stage for MergeStage {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn display_name(&self) -> &'static str {
        "Merge"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["build"]
    }

    async fn preconditions(&self, ctx: &StageContext) -> Result<(), StageError> {
        if ctx.worktree_path.is_empty() {
            return Err(StageError::PreconditionFailed("no worktree_path set".into()));
        }
        if ctx.state.branch_name.is_none() {
            return Err(StageError::PreconditionFailed("no branch_name in state".into()));
        }
        Ok(())
    }

    async fn should_skip(&self, _ctx: &StageContext) -> Result<Option<String>, StageError> {
        Ok(None)
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        info!("=== MERGE PHASE ===");
        let worktree_path = Path::new(&ctx.worktree_path);
        let branch_name = ctx
            .state
            .branch_name
            .clone()
            .ok_or_else(|| StageError::PreconditionFailed("no branch_name in state".into()))?;
        let strategy = Self::strategy_from_config(ctx);
        let adapter = GitAdapter::new(worktree_path);

        let mut conflicts = adapter.merge_into_main(&branch_name, strategy).await?;

        if !conflicts.is_empty() {
            warn!(count = conflicts.len(), "merge conflict, invoking agent to resolve");
            let prompt = format!(
                "Resolve the merge conflicts in the following files and commit the result:\n\n{}",
                conflicts.join("\n")
            );
            invoke_agent(worktree_path, &prompt).await?;
            conflicts = adapter.check_merge_conflicts().await?;

            if !conflicts.is_empty() {
                return Err(StageError::Git(GitError::ConflictUnresolved(conflicts)));
            }
            adapter.commit_all("resolve merge conflicts").await?;
        }

        if !Self::run_validation_tests(worktree_path).await {
            return Ok(StageOutcome::failed(
                "validation tests failed after merge".to_string(),
                "cargo test did not succeed on merged main".to_string(),
            ));
        }

        adapter.push("main").await?;

        let manager = WorktreeManager::new(
            worktree_path
                .ancestors()
                .nth(2)
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| worktree_path.to_path_buf()),
        );
        if let Err(e) = manager.remove(&ctx.adw_id).await {
            warn!(adw_id = %ctx.adw_id, error = %e, "worktree cleanup after merge failed, continuing");
        }
        if let Err(e) = adapter.delete_remote_branch(&branch_name).await {
            warn!(branch_name, error = %e, "remote branch cleanup after merge failed, continuing");
        }

        ctx.state.mark_completed();

        Ok(StageOutcome::completed(format!("merged {branch_name} into main and cleaned up")))
    }
}
