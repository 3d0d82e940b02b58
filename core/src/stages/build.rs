//! The `build` stage: depends on `plan`. Requires a worktree and a
//! resolvable plan file, implements it via the agent, and commits.

use crate::errors::StageError;
use crate::git_adapter::GitAdapter;
use crate::models::{StageContext, StageOutcome};
use crate::stages::agent_invocation::invoke_agent;
use crate::traits::Stage;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

pub struct BuildStage;

#[async_trait]
impl Stage for BuildStage {
    fn name(&self) -> &'static str {
        "build"
    }

    fn display_name(&self) -> &'static str {
        "Build"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["plan"]
    }

    async fn preconditions(&self, ctx: &StageContext) -> Result<(), StageError> {
        if ctx.worktree_path.is_empty() {
            return Err(StageError::PreconditionFailed("no worktree_path set".into()));
        }

        let plan_file = ctx
            .state
            .plan_file
            .as_ref()
            .ok_or_else(|| StageError::PreconditionFailed("no plan_file in state".into()))?;

        let resolved = Path::new(&ctx.worktree_path).join(plan_file);
        if !resolved.exists() {
            return Err(StageError::PreconditionFailed(format!(
                "plan file not found on disk: {}",
                resolved.display()
            )));
        }

        Ok(())
    }

    async fn should_skip(&self, _ctx: &StageContext) -> Result<Option<String>, StageError> {
        Ok(None)
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        info!("=== BUILD PHASE ===");

        let plan_file = ctx.state.plan_file.clone().unwrap_or_default();
        let worktree_path = Path::new(&ctx.worktree_path);
        let plan_contents = tokio::fs::read_to_string(worktree_path.join(&plan_file))
            .await
            .map_err(crate::errors::ProcessError::IoError)?;

        let prompt = format!(
            "Implement the following plan in this worktree, making the necessary code changes:\n\n{plan_contents}"
        );

        let output = invoke_agent(worktree_path, &prompt).await?;
        if !output.success {
            return Err(StageError::Other(format!(
                "build agent exited with code {}: {}",
                output.exit_code,
                output.error.unwrap_or_default()
            )));
        }

        let adapter = GitAdapter::new(worktree_path);
        let committed = adapter
            .commit_all(&format!("adw({}): implement plan", ctx.adw_id))
            .await?;

        Ok(StageOutcome::completed(if committed {
            "implementation committed".to_string()
        } else {
            "agent ran but produced no changes to commit".to_string()
        })
        .with_artifact("committed", serde_json::json!(committed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ADWState;
    use std::collections::HashMap;

    fn ctx(worktree_path: String, plan_file: Option<String>) -> StageContext {
        let mut state = ADWState::new("a1b2c3d4");
        state.plan_file = plan_file;
        StageContext {
            adw_id: "a1b2c3d4".into(),
            issue_number: None,
            state,
            worktree_path,
            config: HashMap::new(),
            previous_stage: None,
            stage_index: 1,
            total_stages: 2,
            completed_stages: vec!["plan".into()],
            skipped_stages: vec![],
            stage_model: None,
        }
    }

    #[tokio::test]
    async fn preconditions_fail_without_plan_file() {
        let stage = BuildStage;
        let context = ctx(".".into(), None);
        let err = stage.preconditions(&context).await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn preconditions_fail_when_plan_file_missing_on_disk() {
        let stage = BuildStage;
        let context = ctx(".".into(), Some("does/not/exist.md".into()));
        let err = stage.preconditions(&context).await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn preconditions_fail_without_worktree_path() {
        let stage = BuildStage;
        let context = ctx("".into(), Some("plan.md".into()));
        let err = stage.preconditions(&context).await.unwrap_err();
        assert!(matches!(err, StageError::PreconditionFailed(_)));
    }
}
