//! The `review` stage: depends on `build`. Never skips based on issue
//! class; skips only on an explicit `skip_review` opt-out. Runs an AI
//! narrative review plus parallel deterministic tool runners (lint /
//! security scanners), aggregates findings, and applies failure
//! thresholds. The bounded resolution loop applies only to the
//! deterministic tool-runner findings, never to the narrative review.

use crate::errors::StageError;
use crate::git_adapter::GitAdapter;
use crate::models::{StageContext, StageOutcome};
use crate::process_runner::{ProcessRunner, ProcessRunnerConfig};
use crate::stages::agent_invocation::invoke_agent;
use crate::traits::Stage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Default bounded-loop attempt count, shared with the `test` stage's
/// resolution loop semantics.
const DEFAULT_MAX_RESOLUTION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub tool: String,
    pub severity: Severity,
    pub message: String,
}

/// Which review "mode" was configured, resolved from `ctx.config["mode"]`
/// (default `comprehensive`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReviewMode {
    Security,
    Code,
    Ui,
    Docs,
    Comprehensive,
}

impl ReviewMode {
    fn from_str(s: &str) -> Self {
        match s {
            "security" => ReviewMode::Security,
            "code" => ReviewMode::Code,
            "ui" => ReviewMode::Ui,
            "docs" => ReviewMode::Docs,
            _ => ReviewMode::Comprehensive,
        }
    }

    /// The tool runners this mode enables. `comprehensive` runs all of them.
    fn tool_names(&self) -> &'static [&'static str] {
        match self {
            ReviewMode::Security => &["cargo_audit"],
            ReviewMode::Code => &["clippy"],
            ReviewMode::Ui => &["clippy"],
            ReviewMode::Docs => &[],
            ReviewMode::Comprehensive => &["clippy", "cargo_audit"],
        }
    }
}

pub struct ReviewStage;

impl ReviewStage {
    /// Runs the configured tool runners concurrently; an individual
    /// runner's process failure does not cancel its siblings, it just
    /// contributes no findings.
    async fn run_tool_runners(worktree_path: &Path, mode: ReviewMode) -> Vec<Finding> {
        let runner = ProcessRunner::new(ProcessRunnerConfig::default());
        let tasks: Vec<_> = mode
            .tool_names()
            .iter()
            .map(|&tool| Self::run_one_tool(&runner, worktree_path, tool))
            .collect();

        let results = futures::future::join_all(tasks).await;
        results.into_iter().flatten().collect()
    }

    async fn run_one_tool(runner: &ProcessRunner, worktree_path: &Path, tool: &str) -> Vec<Finding> {
        let (program, args) = match tool {
            "clippy" => ("cargo", vec!["clippy".to_string(), "--message-format=short".to_string()]),
            "cargo_audit" => ("cargo", vec!["audit".to_string()]),
            _ => return Vec::new(),
        };

        match runner.run(program, &args, worktree_path, None).await {
            Ok(output) if output.success => Vec::new(),
            Ok(output) => parse_findings(tool, &output.output, output.error.as_deref().unwrap_or("")),
            Err(e) => {
                warn!(tool, error = %e, "tool runner failed to execute, contributing no findings");
                Vec::new()
            }
        }
    }
}

/// Every non-empty diagnostic line becomes a `Medium` finding unless it
/// carries a recognizable severity keyword; real tool runners (clippy's
/// JSON mode, cargo-audit's JSON report) would give structured severities
/// instead of this heuristic.
fn parse_findings(tool: &str, stdout: &str, stderr: &str) -> Vec<Finding> {
    stdout
        .lines()
        .chain(stderr.lines())
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let severity = if line.contains("critical") {
                Severity::Critical
            } else if line.contains("error") {
                Severity::High
            } else if line.contains("warning") {
                Severity::Medium
            } else {
                Severity::Low
            };
            Finding {
                tool: tool.to_string(),
                severity,
                message: line.to_string(),
            }
        })
        .collect()
}

struct Thresholds {
    fail_on_critical: bool,
    fail_on_high: bool,
    max_issues_before_fail: Option<u64>,
    fail_on_security_critical: bool,
}

impl Thresholds {
    fn from_config(config: &std::collections::HashMap<String, serde_json::Value>) -> Self {
        Self {
            fail_on_critical: config.get("fail_on_critical").and_then(|v| v.as_bool()).unwrap_or(true),
            fail_on_high: config.get("fail_on_high").and_then(|v| v.as_bool()).unwrap_or(false),
            max_issues_before_fail: config.get("max_issues_before_fail").and_then(|v| v.as_u64()),
            fail_on_security_critical: config
                .get("fail_on_security_critical")
                .and_then(|v| v.as_bool())
                .unwrap_or(true),
        }
    }

    fn violated_by(&self, findings: &[Finding]) -> bool {
        let any_critical = findings.iter().any(|f| f.severity == Severity::Critical);
        let any_high = findings.iter().any(|f| f.severity >= Severity::High);
        let any_security_critical = findings
            .iter()
            .any(|f| f.tool == "cargo_audit" && f.severity == Severity::Critical);

        if self.fail_on_critical && any_critical {
            return true;
        }
        if self.fail_on_high && any_high {
            return true;
        }
        if self.fail_on_security_critical && any_security_critical {
            return true;
        }
        if let Some(max) = self.max_issues_before_fail {
            if findings.len() as u64 > max {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl Stage for ReviewStage {
    fn name(&self) -> &'static str {
        "review"
    }

    fn display_name(&self) -> &'static str {
        "Review"
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
        let opted_out = ctx
            .config
            .get("skip_review")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if opted_out {
            return Ok(Some("skip_review opted out in stage config".to_string()));
        }
        Ok(None)
    }

    async fn execute(&self, ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        info!("=== REVIEW PHASE ===");
        let worktree_path = Path::new(&ctx.worktree_path);
        let mode = ReviewMode::from_str(
            ctx.config.get("mode").and_then(|v| v.as_str()).unwrap_or("comprehensive"),
        );
        let thresholds = Thresholds::from_config(&ctx.config);
        let max_attempts = ctx
            .config
            .get("max_resolution_attempts")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_MAX_RESOLUTION_ATTEMPTS);

        // Narrative review runs once; it is never re-invoked by the
        // resolution loop below, only the deterministic tool runners are.
        let narrative_prompt =
            "Review the changes in this worktree for correctness, security, and code \
             quality. Summarize your findings."
                .to_string();
        let narrative = invoke_agent(worktree_path, &narrative_prompt).await?;

        let mut findings = Self::run_tool_runners(worktree_path, mode).await;
        let mut attempt = 0;
        while thresholds.violated_by(&findings) && attempt < max_attempts {
            attempt += 1;
            let summary: Vec<String> = findings.iter().map(|f| format!("[{:?}] {}", f.severity, f.message)).collect();
            let fix_prompt = format!(
                "The following lint/security findings must be fixed:\n\n{}",
                summary.join("\n")
            );
            let fix_output = invoke_agent(worktree_path, &fix_prompt).await?;
            if fix_output.success {
                let adapter = GitAdapter::new(worktree_path);
                adapter
                    .commit_all(&format!("adw({}): resolve review findings (attempt {attempt})", ctx.adw_id))
                    .await?;
            }
            findings = Self::run_tool_runners(worktree_path, mode).await;
        }

        if thresholds.violated_by(&findings) {
            return Ok(StageOutcome::failed(
                format!("{} unresolved review finding(s) after {attempt} attempt(s)", findings.len()),
                serde_json::to_string(&findings).unwrap_or_default(),
            )
            .with_artifact("findings", serde_json::json!(findings))
            .with_artifact("narrative", serde_json::json!(narrative.output)));
        }

        Ok(StageOutcome::completed(format!("review passed with {} finding(s)", findings.len()))
            .with_artifact("findings", serde_json::json!(findings))
            .with_artifact("narrative", serde_json::json!(narrative.output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn critical_finding_fails_default_thresholds() {
        let thresholds = Thresholds::from_config(&HashMap::new());
        let findings = vec![Finding {
            tool: "clippy".into(),
            severity: Severity::Critical,
            message: "oops".into(),
        }];
        assert!(thresholds.violated_by(&findings));
    }

    #[test]
    fn high_finding_passes_by_default_when_fail_on_high_is_false() {
        let thresholds = Thresholds::from_config(&HashMap::new());
        let findings = vec![Finding {
            tool: "clippy".into(),
            severity: Severity::High,
            message: "oops".into(),
        }];
        assert!(!thresholds.violated_by(&findings));
    }

    #[test]
    fn max_issues_before_fail_trips_on_volume() {
        let mut config = HashMap::new();
        config.insert("fail_on_critical".to_string(), serde_json::json!(false));
        config.insert("fail_on_security_critical".to_string(), serde_json::json!(false));
        config.insert("max_issues_before_fail".to_string(), serde_json::json!(1));
        let thresholds = Thresholds::from_config(&config);
        let findings = vec![
            Finding { tool: "clippy".into(), severity: Severity::Low, message: "a".into() },
            Finding { tool: "clippy".into(), severity: Severity::Low, message: "b".into() },
        ];
        assert!(thresholds.violated_by(&findings));
    }

    #[test]
    fn security_critical_from_cargo_audit_trips_regardless_of_fail_on_critical() {
        let mut config = HashMap::new();
        config.insert("fail_on_critical".to_string(), serde_json::json!(false));
        let thresholds = Thresholds::from_config(&config);
        let findings = vec![Finding {
            tool: "cargo_audit".into(),
            severity: Severity::Critical,
            message: "RUSTSEC-advisory".into(),
        }];
        assert!(thresholds.violated_by(&findings));
    }

    #[test]
    fn mode_from_str_falls_back_to_comprehensive() {
        assert_eq!(ReviewMode::from_str("bogus").tool_names(), ReviewMode::Comprehensive.tool_names());
    }
}
