//! The orchestrator engine: loads or resumes a `WorkflowExecution`,
//! iterates its stages through the registry, applies failure policy, and
//! emits lifecycle events for the event fabric to forward.

use crate::config_loader::{OrchestratorConfig, WorkflowConfig};
use crate::errors::{StageError, StateStoreError, StateStoreResult};
use crate::models::{
    ADWState, ActivityLogEntry, StageContext, StageExecution, StageStatus, WorkflowExecution,
    WorkflowStatus,
};
use crate::stages::registry::StageRegistry;
use crate::traits::StateStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// The lifecycle/event kinds the engine emits. Distinct from the frontend's
/// richer `agent`/`transport` event families (owned by the event fabric);
/// this is only what the orchestrator itself produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorEventKind {
    WorkflowStarted,
    WorkflowCompleted,
    WorkflowFailed,
    StageStarted,
    StageCompleted,
    StageSkipped,
    StageFailed,
}

/// One emitted lifecycle event, carrying every field the stage-event HTTP
/// endpoint's transition-mapping table needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorEvent {
    pub kind: OrchestratorEventKind,
    pub adw_id: String,
    pub workflow_name: String,
    pub stage_name: String,
    pub previous_stage: Option<String>,
    pub next_stage: Option<String>,
    pub stage_index: usize,
    pub total_stages: usize,
    pub completed_stages: Vec<String>,
    pub pending_stages: Vec<String>,
    pub message: String,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub duration_ms: Option<i64>,
}

/// The engine's sink for lifecycle events. A no-op default lets tests
/// construct an `Orchestrator` without an event fabric; the daemon wires
/// a real forwarder (to `/api/stage-event` or directly to the broadcast
/// manager) via its own implementation.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: OrchestratorEvent);
}

/// Emits to nowhere; used when the engine runs headless (e.g. the CLI,
/// which logs instead of broadcasting).
pub struct NullEventEmitter;

#[async_trait]
impl EventEmitter for NullEventEmitter {
    async fn emit(&self, event: OrchestratorEvent) {
        info!(
            kind = ?event.kind,
            adw_id = %event.adw_id,
            stage = %event.stage_name,
            "{}",
            event.message
        );
    }
}

pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    registry: StageRegistry,
    emitter: Arc<dyn EventEmitter>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StateStore>, emitter: Arc<dyn EventEmitter>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            registry: StageRegistry::new(),
            emitter,
            config,
        }
    }

    /// Runs `workflow` against `adw_id`'s state to completion (or failure).
    /// Loads the existing `ADWState` and resumes any in-progress
    /// `WorkflowExecution` found in `orchestrator_state`; creates a fresh
    /// one otherwise.
    pub async fn run(&self, adw_id: &str, worktree_path: &str, workflow: &WorkflowConfig) -> StateStoreResult<()> {
        let mut state = self
            .store
            .load(adw_id)
            .await?
            .ok_or_else(|| StateStoreError::NotFound(adw_id.to_string()))?;
        state.worktree_path = Some(worktree_path.to_string());

        let stage_names = workflow.enabled_stage_names();
        let mut execution = load_or_create_execution(&state, &workflow.workflow_name, adw_id, &stage_names);

        let start_index = if execution.is_resumable() {
            info!(adw_id, resume_index = execution.current_stage_index, "resuming workflow execution");
            execution.current_stage_index
        } else {
            execution = WorkflowExecution::new(&workflow.workflow_name, adw_id, &stage_names);
            0
        };

        execution.status = WorkflowStatus::Running;
        if execution.started_at.is_none() {
            execution.started_at = Some(Utc::now());
        }

        state.append_adw_name(&workflow.workflow_name);
        state.workflow_name = Some(workflow.workflow_name.clone());

        if let Some(first_stage) = stage_names.first() {
            self.emitter
                .emit(OrchestratorEvent {
                    kind: OrchestratorEventKind::WorkflowStarted,
                    adw_id: adw_id.to_string(),
                    workflow_name: workflow.workflow_name.clone(),
                    stage_name: first_stage.clone(),
                    previous_stage: None,
                    next_stage: Some(first_stage.clone()),
                    stage_index: 0,
                    total_stages: stage_names.len(),
                    completed_stages: execution.completed_stage_names(),
                    pending_stages: execution.pending_stage_names(),
                    message: format!("workflow {} started", workflow.workflow_name),
                    error: None,
                    skip_reason: None,
                    duration_ms: None,
                })
                .await;
        }

        persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;

        let mut workflow_failed: Option<String> = None;
        let mut previous_completed_stage: Option<String> = None;

        // Failure policy: "continue_on_failure in orchestrator config or
        // workflow config" -- either source opting in is enough.
        let continue_on_failure = self.config.continue_on_failure || workflow.continue_on_failure.unwrap_or(false);

        for i in start_index..workflow.stages.len() {
            let stage_config = &workflow.stages[i];
            execution.current_stage_index = i;

            if stage_config.name != execution.stages[i].stage_name {
                warn!(
                    expected = %execution.stages[i].stage_name,
                    actual = %stage_config.name,
                    "workflow config drifted from persisted execution stage order, trusting config"
                );
            }

            if execution.stages[i].status == StageStatus::Completed {
                previous_completed_stage = Some(stage_config.name.clone());
                continue;
            }

            if !stage_config.enabled {
                execution.stages[i].status = StageStatus::Skipped;
                self.emit_skip(&workflow.workflow_name, adw_id, &execution, i, &stage_names, "disabled in workflow config".to_string())
                    .await;
                persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
                continue;
            }

            let Some(stage) = self.registry.create(&stage_config.name) else {
                warn!(stage = %stage_config.name, "unknown stage in workflow config, skipping");
                continue;
            };

            let mut ctx = StageContext {
                adw_id: adw_id.to_string(),
                issue_number: state.issue_number,
                state: state.clone(),
                worktree_path: worktree_path.to_string(),
                config: stage_config.config.clone(),
                previous_stage: previous_completed_stage.clone(),
                stage_index: i,
                total_stages: stage_names.len(),
                completed_stages: execution.completed_stage_names(),
                skipped_stages: Vec::new(),
                stage_model: resolve_model_override(stage_config, &state, &self.config),
            };

            if let Err(e) = stage.preconditions(&ctx).await {
                execution.stages[i].status = StageStatus::Failed;
                execution.stages[i].error = Some(e.to_string());
                self.emit_failure(&workflow.workflow_name, adw_id, &execution, i, &stage_names, e.to_string())
                    .await;
                workflow_failed = Some(e.to_string());
                stage.cleanup(&ctx).await;
                if !continue_on_failure {
                    persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
                    break;
                }
                persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
                continue;
            }

            match stage.should_skip(&ctx).await {
                Ok(Some(reason)) => {
                    execution.stages[i].status = StageStatus::Skipped;
                    self.emit_skip(&workflow.workflow_name, adw_id, &execution, i, &stage_names, reason).await;
                    stage.cleanup(&ctx).await;
                    persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
                    continue;
                }
                Err(e) => {
                    execution.stages[i].status = StageStatus::Failed;
                    execution.stages[i].error = Some(e.to_string());
                    self.emit_failure(&workflow.workflow_name, adw_id, &execution, i, &stage_names, e.to_string())
                        .await;
                    workflow_failed = Some(e.to_string());
                    stage.cleanup(&ctx).await;
                    if !continue_on_failure {
                        persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
                        break;
                    }
                    persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
                    continue;
                }
                Ok(None) => {}
            }

            self.emit_started(&workflow.workflow_name, adw_id, &execution, i, &stage_names).await;
            execution.stages[i].status = StageStatus::Running;
            execution.stages[i].attempts += 1;
            let started = Utc::now();

            let result = stage.execute(&mut ctx).await;

            // Persist whatever the stage mutated on `ctx.state` (e.g.
            // `PlanStage` setting `plan_file`) before reloading -- otherwise
            // the reload below discards it and the next stage's `ctx` is
            // rebuilt from a copy that never saw the write.
            self.store.save(&ctx.state).await?;

            // Reload state from storage before checking failure policy: the
            // subprocess invoked inside `execute` may have mutated the row
            // out from under this in-memory copy.
            if let Some(reloaded) = self.store.load(adw_id).await? {
                state = reloaded;
            }
            state.worktree_path = Some(worktree_path.to_string());

            let duration_ms = (Utc::now() - started).num_milliseconds();
            execution.stages[i].duration_ms = Some(duration_ms);
            execution.stages[i].completed_at = Some(Utc::now());

            match result {
                Ok(outcome) => {
                    execution.stages[i].status = outcome.status;
                    execution.stages[i].artifacts = outcome.artifacts;
                    execution.stages[i].error = outcome.error.clone();

                    if outcome.status == StageStatus::Failed {
                        stage.on_failure(&ctx, &StageError::Other(outcome.error.clone().unwrap_or_default())).await;
                        self.emit_failure(
                            &workflow.workflow_name, adw_id, &execution, i, &stage_names,
                            outcome.error.clone().unwrap_or(outcome.message.clone()),
                        )
                        .await;
                        workflow_failed = Some(outcome.error.unwrap_or(outcome.message));
                    } else {
                        previous_completed_stage = Some(stage_config.name.clone());
                        self.emit_completed(&workflow.workflow_name, adw_id, &execution, i, &stage_names, outcome.message, Some(duration_ms))
                            .await;
                    }
                }
                Err(e) => {
                    execution.stages[i].status = StageStatus::Failed;
                    execution.stages[i].error = Some(e.to_string());
                    stage.on_failure(&ctx, &e).await;
                    self.emit_failure(&workflow.workflow_name, adw_id, &execution, i, &stage_names, e.to_string())
                        .await;
                    workflow_failed = Some(e.to_string());
                }
            }

            stage.cleanup(&ctx).await;
            if let Some(reloaded) = self.store.load(adw_id).await? {
                state = reloaded;
            }
            state.worktree_path = Some(worktree_path.to_string());

            persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;

            if workflow_failed.is_some() && !continue_on_failure {
                break;
            }
            workflow_failed = None;
        }

        if let Some(err) = workflow_failed {
            execution.status = WorkflowStatus::Failed;
            execution.error = Some(err.clone());
            persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;
            self.store
                .append_activity(&ActivityLogEntry::new(adw_id, "workflow_failed").with_event_data(json!({ "error": err })))
                .await?;
            return Ok(());
        }

        execution.status = WorkflowStatus::Completed;
        execution.completed_at = Some(Utc::now());
        state.mark_completed();
        persist_execution(&self.store, &mut state, &workflow.config(&self.config), &execution).await?;

        self.store
            .append_activity(&ActivityLogEntry::new(adw_id, "workflow_completed"))
            .await?;

        self.emitter
            .emit(OrchestratorEvent {
                kind: OrchestratorEventKind::WorkflowCompleted,
                adw_id: adw_id.to_string(),
                workflow_name: workflow.workflow_name.clone(),
                stage_name: stage_names.last().cloned().unwrap_or_default(),
                previous_stage: stage_names.last().cloned(),
                next_stage: Some("ready-to-merge".to_string()),
                stage_index: stage_names.len(),
                total_stages: stage_names.len(),
                completed_stages: execution.completed_stage_names(),
                pending_stages: Vec::new(),
                message: format!("workflow {} completed", workflow.workflow_name),
                error: None,
                skip_reason: None,
                duration_ms: None,
            })
            .await;

        Ok(())
    }

    async fn emit_started(
        &self,
        workflow_name: &str,
        adw_id: &str,
        execution: &WorkflowExecution,
        i: usize,
        stage_names: &[String],
    ) {
        self.emitter
            .emit(self.build_event(
                OrchestratorEventKind::StageStarted,
                workflow_name,
                adw_id,
                execution,
                i,
                stage_names,
                format!("stage {} started", stage_names[i]),
                None,
                None,
                None,
            ))
            .await;
    }

    async fn emit_completed(
        &self,
        workflow_name: &str,
        adw_id: &str,
        execution: &WorkflowExecution,
        i: usize,
        stage_names: &[String],
        message: String,
        duration_ms: Option<i64>,
    ) {
        self.emitter
            .emit(self.build_event(
                OrchestratorEventKind::StageCompleted,
                workflow_name,
                adw_id,
                execution,
                i,
                stage_names,
                message,
                None,
                None,
                duration_ms,
            ))
            .await;
    }

    async fn emit_skip(
        &self,
        workflow_name: &str,
        adw_id: &str,
        execution: &WorkflowExecution,
        i: usize,
        stage_names: &[String],
        reason: String,
    ) {
        self.emitter
            .emit(self.build_event(
                OrchestratorEventKind::StageSkipped,
                workflow_name,
                adw_id,
                execution,
                i,
                stage_names,
                format!("stage {} skipped: {reason}", stage_names[i]),
                None,
                Some(reason),
                None,
            ))
            .await;
    }

    async fn emit_failure(
        &self,
        workflow_name: &str,
        adw_id: &str,
        execution: &WorkflowExecution,
        i: usize,
        stage_names: &[String],
        error: String,
    ) {
        self.emitter
            .emit(self.build_event(
                OrchestratorEventKind::StageFailed,
                workflow_name,
                adw_id,
                execution,
                i,
                stage_names,
                format!("stage {} failed: {error}", stage_names[i]),
                Some(error),
                None,
                None,
            ))
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    fn build_event(
        &self,
        kind: OrchestratorEventKind,
        workflow_name: &str,
        adw_id: &str,
        execution: &WorkflowExecution,
        i: usize,
        stage_names: &[String],
        message: String,
        error: Option<String>,
        skip_reason: Option<String>,
        duration_ms: Option<i64>,
    ) -> OrchestratorEvent {
        let previous_stage = execution
            .stages
            .iter()
            .take(i)
            .rev()
            .find(|s| s.status == StageStatus::Completed)
            .map(|s| s.stage_name.clone());
        let next_stage = stage_names.get(i + 1).cloned();

        OrchestratorEvent {
            kind,
            adw_id: adw_id.to_string(),
            workflow_name: workflow_name.to_string(),
            stage_name: stage_names[i].clone(),
            previous_stage,
            next_stage,
            stage_index: i,
            total_stages: stage_names.len(),
            completed_stages: execution.completed_stage_names(),
            pending_stages: execution.pending_stage_names(),
            message,
            error,
            skip_reason,
            duration_ms,
        }
    }
}

fn load_or_create_execution(state: &ADWState, workflow_name: &str, adw_id: &str, stage_names: &[String]) -> WorkflowExecution {
    state
        .orchestrator_state
        .as_ref()
        .and_then(|v| v.get("execution").cloned())
        .and_then(|v| serde_json::from_value::<WorkflowExecution>(v).ok())
        .unwrap_or_else(|| WorkflowExecution::new(workflow_name, adw_id, stage_names))
}

/// Resolves a stage's model per the documented priority: stage config >
/// per-ADW state override > no override.
fn resolve_model_override(
    stage_config: &crate::config_loader::StageConfigEntry,
    state: &ADWState,
    _orchestrator_config: &OrchestratorConfig,
) -> Option<String> {
    stage_config
        .config
        .get("model")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| state.model_set.clone())
}

async fn persist_execution(
    store: &Arc<dyn StateStore>,
    state: &mut ADWState,
    orchestrator_config: &HashMap<String, serde_json::Value>,
    execution: &WorkflowExecution,
) -> StateStoreResult<()> {
    let stage_names: Vec<String> = execution.stages.iter().map(|s| s.stage_name.clone()).collect();
    state.orchestrator_state = Some(json!({
        "workflow_name": execution.workflow_name,
        "stages": stage_names,
        "config": orchestrator_config,
        "execution": execution,
    }));
    state.current_stage = stage_names
        .get(execution.current_stage_index)
        .cloned()
        .unwrap_or_else(|| state.current_stage.clone());
    state.status = match execution.status {
        WorkflowStatus::Pending => "pending".to_string(),
        WorkflowStatus::Running => "running".to_string(),
        WorkflowStatus::Paused => "paused".to_string(),
        WorkflowStatus::Failed => "failed".to_string(),
        WorkflowStatus::Completed => "completed".to_string(),
    };
    store.save(state).await
}

/// Extension used only inside this module to turn an `OrchestratorConfig`
/// into the small config map the persisted execution-state shape wants
/// (`{}` when no orchestrator config applies).
trait OrchestratorConfigMap {
    fn config(&self, orchestrator_config: &OrchestratorConfig) -> HashMap<String, serde_json::Value>;
}

impl OrchestratorConfigMap for WorkflowConfig {
    fn config(&self, orchestrator_config: &OrchestratorConfig) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        if orchestrator_config.max_instances.is_some() || orchestrator_config.continue_on_failure {
            map.insert("max_instances".to_string(), json!(orchestrator_config.max_instances));
            map.insert("continue_on_failure".to_string(), json!(orchestrator_config.continue_on_failure));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::SqliteStateStore;

    async fn seeded_store(adw_id: &str) -> Arc<dyn StateStore> {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        let mut state = ADWState::new(adw_id);
        state.issue_body = Some("do the thing".to_string());
        store.save(&state).await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn run_fails_fast_when_adw_id_not_found() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        let store: Arc<dyn StateStore> = Arc::new(store);
        let orchestrator = Orchestrator::new(store, Arc::new(NullEventEmitter), OrchestratorConfig::default());
        let workflow = WorkflowConfig::from_stage_names("w", &["plan".to_string()]);
        let err = orchestrator.run("deadbeef", "/tmp/nonexistent", &workflow).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn persist_execution_writes_expected_shape() {
        let store = seeded_store("a1b2c3d4").await;
        let mut state = store.load("a1b2c3d4").await.unwrap().unwrap();
        let execution = WorkflowExecution::new("w", "a1b2c3d4", &["plan".to_string()]);
        let config = OrchestratorConfig { continue_on_failure: true, ..Default::default() };
        let workflow = WorkflowConfig::from_stage_names("w", &["plan".to_string()]);
        persist_execution(&store, &mut state, &workflow.config(&config), &execution).await.unwrap();

        let reloaded = store.load("a1b2c3d4").await.unwrap().unwrap();
        let orchestrator_state = reloaded.orchestrator_state.unwrap();
        assert_eq!(orchestrator_state["workflow_name"], json!("w"));
        assert_eq!(orchestrator_state["stages"], json!(["plan"]));
        assert_eq!(orchestrator_state["config"]["continue_on_failure"], json!(true));
    }

    #[tokio::test]
    async fn plan_stage_mutation_survives_into_build_stage_preconditions() {
        // Regression test for the chained `plan,build` happy path
        // (SPEC_FULL.md's "persists plan_file into state", §8 scenario 1):
        // `PlanStage::execute` sets `ctx.state.plan_file`, and that write
        // must still be visible to `BuildStage::preconditions` on the next
        // loop iteration instead of being discarded by the post-execute
        // reload.
        let adw_id = "f0e1d2c3";
        let worktree = tempfile::tempdir().unwrap();
        let plan_dir = worktree.path().join("agents").join(adw_id).join("sdlc_planner");
        tokio::fs::create_dir_all(&plan_dir).await.unwrap();
        tokio::fs::write(plan_dir.join("plan.md"), "# plan\n").await.unwrap();

        // Stand in for the real `claude` binary: `echo` exits 0 immediately,
        // which is enough for `PlanStage::execute` to treat the run as
        // successful and fall back to the conventional plan path.
        std::env::set_var("CLAUDE_CODE_PATH", "echo");

        let store = seeded_store(adw_id).await;
        let orchestrator = Orchestrator::new(store.clone(), Arc::new(NullEventEmitter), OrchestratorConfig::default());
        let workflow = WorkflowConfig::from_stage_names("w", &["plan".to_string(), "build".to_string()]);

        orchestrator
            .run(adw_id, &worktree.path().display().to_string(), &workflow)
            .await
            .unwrap();

        std::env::remove_var("CLAUDE_CODE_PATH");

        let reloaded = store.load(adw_id).await.unwrap().unwrap();
        assert_eq!(
            reloaded.plan_file.as_deref(),
            Some("agents/f0e1d2c3/sdlc_planner/plan.md")
        );

        let execution: WorkflowExecution =
            serde_json::from_value(reloaded.orchestrator_state.unwrap()["execution"].clone()).unwrap();
        assert_eq!(execution.stages[0].status, StageStatus::Completed);
        assert_eq!(
            execution.stages[1].status,
            StageStatus::Completed,
            "build must not fail preconditions with 'no plan_file in state'"
        );
    }

    #[tokio::test]
    async fn workflow_config_continue_on_failure_is_honored_even_when_orchestrator_config_is_not() {
        let store = seeded_store("b2c3d4e5").await;
        let orchestrator = Orchestrator::new(store.clone(), Arc::new(NullEventEmitter), OrchestratorConfig::default());

        let mut workflow = WorkflowConfig::from_stage_names("w", &["build".to_string(), "document".to_string()]);
        workflow.continue_on_failure = Some(true);

        // No `plan_file` was ever set, so `build`'s preconditions fail; with
        // `continue_on_failure` coming from the *workflow* config (not the
        // orchestrator config, which defaults to false), the loop must still
        // reach `document` instead of stopping after `build`.
        orchestrator.run("b2c3d4e5", "/tmp/definitely-not-a-real-worktree-xyz", &workflow).await.unwrap();

        let reloaded = store.load("b2c3d4e5").await.unwrap().unwrap();
        let execution: WorkflowExecution =
            serde_json::from_value(reloaded.orchestrator_state.unwrap()["execution"].clone()).unwrap();
        assert_eq!(execution.stages[0].stage_name, "build");
        assert_eq!(execution.stages[0].status, StageStatus::Failed);
        assert_eq!(execution.stages[1].stage_name, "document");
        assert_eq!(execution.stages[1].status, StageStatus::Failed);
    }

    #[test]
    fn resolve_model_override_prefers_stage_config_over_state() {
        let mut stage_config = crate::config_loader::StageConfigEntry {
            name: "plan".to_string(),
            enabled: true,
            depends_on: Vec::new(),
            config: HashMap::new(),
        };
        stage_config.config.insert("model".to_string(), json!("opus"));
        let mut state = ADWState::new("a1b2c3d4");
        state.model_set = Some("sonnet".to_string());
        let resolved = resolve_model_override(&stage_config, &state, &OrchestratorConfig::default());
        assert_eq!(resolved, Some("opus".to_string()));
    }

    #[test]
    fn resolve_model_override_falls_back_to_state_when_stage_config_silent() {
        let stage_config = crate::config_loader::StageConfigEntry {
            name: "plan".to_string(),
            enabled: true,
            depends_on: Vec::new(),
            config: HashMap::new(),
        };
        let mut state = ADWState::new("a1b2c3d4");
        state.model_set = Some("sonnet".to_string());
        let resolved = resolve_model_override(&stage_config, &state, &OrchestratorConfig::default());
        assert_eq!(resolved, Some("sonnet".to_string()));
    }
}
