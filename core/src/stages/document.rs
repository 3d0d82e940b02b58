//! The `document` stage: depends on `build`. Skips when `git diff` is
//! empty; otherwise asks the agent to produce documentation and commits.

use crate::errors::StageError;
use crate::git_adapter::GitAdapter;
use crate::models::{StageContext, StageOutcome};
use crate::stages::agent_invocation::invoke_agent;
use crate::traits::Stage;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

pub struct DocumentStage;

#[async_trait]
impl Stage for DocumentStage {
    fn name(&self) -> &'static str {
        "document"
    }

    fn display_name(&self) -> &'static str {
        "Document"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &["build"]
    }

    async fn preconditions(&self, ctx: &StageContext) -> Result<(), StageError> {
        if ctx.worktree_path.is_empty() {
            return Err(StageError::PreconditionFailed("no worktree_path set".into()));
        }
        Ok(())
    }

    async fn should_skip(&self, ctx: &StageContext) -> Result<Option<String>, StageError> {
        let adapter = GitAdapter::new(Path::new(&ctx.worktree_path));
        if adapter.diff_is_empty().await? {
            return Ok(Some("no uncommitted changes to document".to_string()));
        }
        Ok(None)
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        info!("=== DOCUMENT PHASE ===");
        let worktree_path = Path::new(&ctx.worktree_path);

        let prompt = "Review the uncommitted changes in this worktree and update or \
             add documentation (README, doc comments, CHANGELOG) reflecting them."
            .to_string();

        let output = invoke_agent(worktree_path, &prompt).await?;
        if !output.success {
            return Err(StageError::Other(format!(
                "documentation agent exited with code {}: {}",
                output.exit_code,
                output.error.unwrap_or_default()
            )));
        }

        let adapter = GitAdapter::new(worktree_path);
        let committed = adapter
            .commit_all(&format!("adw({}): update documentation", ctx.adw_id))
            .await?;

        Ok(StageOutcome::completed(if committed {
            "documentation committed".to_string()
        } else {
            "agent ran but produced no documentation changes to commit".to_string()
        })
        .with_artifact("committed", serde_json::json!(committed)))
    }
}
