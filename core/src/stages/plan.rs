//! The `plan` stage: no dependencies, never auto-skips. Runs the planner
//! agent and persists the resulting plan file path into state.

use crate::errors::StageError;
use crate::models::{StageContext, StageOutcome};
use crate::stages::agent_invocation::invoke_agent;
use crate::traits::Stage;
use async_trait::async_trait;
use tracing::info;

/// Conventional plan-file location relative to the worktree root, matching
/// the path `GET /api/adws/{adw_id}/plan` reads.
pub fn conventional_plan_path(adw_id: &str) -> String {
    format!("agents/{adw_id}/sdlc_planner/plan.md")
}

pub struct PlanStage;

#[async_trait]
impl Stage for PlanStage {
    fn name(&self) -> &'static str {
        "plan"
    }

    fn display_name(&self) -> &'static str {
        "Plan"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    async fn preconditions(&self, _ctx: &StageContext) -> Result<(), StageError> {
        Ok(())
    }

    async fn should_skip(&self, _ctx: &StageContext) -> Result<Option<String>, StageError> {
        Ok(None)
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        info!("=== PLAN PHASE ===");

        let issue_body = ctx.state.issue_body.clone().unwrap_or_default();
        let prompt = format!(
            "Produce an implementation plan for the following issue and write it to \
             agents/{adw_id}/sdlc_planner/plan.md:\n\n{issue_body}",
            adw_id = ctx.adw_id,
        );

        let output = invoke_agent(std::path::Path::new(&ctx.worktree_path), &prompt).await?;
        if !output.success {
            return Err(StageError::Other(format!(
                "planner agent exited with code {}: {}",
                output.exit_code,
                output.error.unwrap_or_default()
            )));
        }

        let plan_file = extract_plan_file(&output.output)
            .unwrap_or_else(|| conventional_plan_path(&ctx.adw_id));
        ctx.state.plan_file = Some(plan_file.clone());

        Ok(StageOutcome::completed(format!("plan written to {plan_file}"))
            .with_artifact("plan_file", serde_json::json!(plan_file)))
    }
}

/// Looks for a path ending in `.md` in the agent's captured stdout;
/// falls back to the conventional path when none is found.
fn extract_plan_file(agent_output: &str) -> Option<String> {
    agent_output
        .lines()
        .flat_map(|line| line.split_whitespace())
        .find(|token| token.ends_with(".md"))
        .map(|token| token.trim_matches(|c| c == '"' || c == '\'' || c == ',').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plan_file_path_from_agent_output() {
        let output = "Thinking...\nWrote plan to agents/a1b2c3d4/sdlc_planner/plan.md\nDone.";
        assert_eq!(
            extract_plan_file(output),
            Some("agents/a1b2c3d4/sdlc_planner/plan.md".to_string())
        );
    }

    #[test]
    fn falls_back_to_none_when_no_md_path_present() {
        assert_eq!(extract_plan_file("no file mentioned here"), None);
    }

    #[test]
    fn conventional_path_matches_plan_endpoint_contract() {
        assert_eq!(
            conventional_plan_path("a1b2c3d4"),
            "agents/a1b2c3d4/sdlc_planner/plan.md"
        );
    }
}
