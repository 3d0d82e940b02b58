/// Data model shared across the state store, discovery layer, stage
/// contracts, and the event fabric.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One of the four classes a triggering issue may carry, with the leading
/// slash preserved internally and stripped only at the discovery boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    #[serde(rename = "/feature")]
    Feature,
    #[serde(rename = "/bug")]
    Bug,
    #[serde(rename = "/chore")]
    Chore,
    #[serde(rename = "/patch")]
    Patch,
}

impl IssueClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueClass::Feature => "/feature",
            IssueClass::Bug => "/bug",
            IssueClass::Chore => "/chore",
            IssueClass::Patch => "/patch",
        }
    }

    /// The class name with its leading slash stripped, for external display.
    pub fn stripped(&self) -> &'static str {
        &self.as_str()[1..]
    }
}

/// Where the triggering issue originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Github,
    Kanban,
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Kanban
    }
}

/// A row in `adw_states`, keyed by `adw_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ADWState {
    pub adw_id: String,
    pub issue_number: Option<i64>,
    pub issue_title: Option<String>,
    pub issue_body: Option<String>,
    pub issue_class: Option<String>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<String>,

    #[serde(default = "default_stage")]
    pub current_stage: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub workflow_name: Option<String>,
    pub model_set: Option<String>,
    #[serde(default)]
    pub data_source: DataSource,

    pub issue_json: Option<Value>,
    pub orchestrator_state: Option<Value>,
    pub plan_file: Option<String>,
    #[serde(default)]
    pub all_adws: Vec<String>,
    pub patch_file: Option<String>,
    #[serde(default)]
    pub patch_history: Vec<Value>,
    pub patch_source_mode: Option<String>,

    pub backend_port: Option<i64>,
    pub websocket_port: Option<i64>,
    pub frontend_port: Option<i64>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn default_stage() -> String {
    "backlog".to_string()
}

fn default_status() -> String {
    "pending".to_string()
}

/// Stages a workflow may have reached that no further transition follows.
pub const TERMINAL_STAGES: &[&str] = &["ready-to-merge", "pr", "completed", "errored"];

/// The closed set of stages the frontend understands transitions between.
pub const VALID_STAGES: &[&str] = &[
    "backlog",
    "plan",
    "build",
    "test",
    "review",
    "document",
    "ready-to-merge",
    "pr",
    "completed",
    "errored",
];

impl ADWState {
    pub fn new(adw_id: impl Into<String>) -> Self {
        Self {
            adw_id: adw_id.into(),
            issue_number: None,
            issue_title: None,
            issue_body: None,
            issue_class: None,
            branch_name: None,
            worktree_path: None,
            current_stage: default_stage(),
            status: default_status(),
            workflow_name: None,
            model_set: None,
            data_source: DataSource::default(),
            issue_json: None,
            orchestrator_state: None,
            plan_file: None,
            all_adws: Vec::new(),
            patch_file: None,
            patch_history: Vec::new(),
            patch_source_mode: None,
            backend_port: None,
            websocket_port: None,
            frontend_port: None,
            created_at: None,
            updated_at: None,
            completed_at: None,
            deleted_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Appends `name` to `all_adws` unless it's already present (set-like).
    pub fn append_adw_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.all_adws.iter().any(|existing| existing == &name) {
            self.all_adws.push(name);
        }
    }

    pub fn mark_completed(&mut self) {
        self.current_stage = "ready-to-merge".to_string();
        self.status = "completed".to_string();
        self.completed_at = Some(Utc::now());
    }
}

/// A lightweight projection of `ADWState` for list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ADWStateSummary {
    pub adw_id: String,
    pub issue_class: Option<String>,
    pub issue_number: Option<i64>,
    pub issue_title: Option<String>,
    pub branch_name: Option<String>,
    pub completed: bool,
}

/// An append-only row in `adw_activity_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub adw_id: String,
    pub event_type: String,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub event_data: Option<Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(adw_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            adw_id: adw_id.into(),
            event_type: event_type.into(),
            field_changed: None,
            old_value: None,
            new_value: None,
            event_data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_event_data(mut self, data: Value) -> Self {
        self.event_data = Some(data);
        self
    }
}

/// Execution status of an entire workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Failed,
    Completed,
}

/// Execution status of a single stage within a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// The in-progress record of one stage's attempts, persisted inside
/// `WorkflowExecution.stages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub stage_name: String,
    pub status: StageStatus,
    #[serde(default)]
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: HashMap<String, Value>,
    pub duration_ms: Option<i64>,
}

impl StageExecution {
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            status: StageStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            error: None,
            artifacts: HashMap::new(),
            duration_ms: None,
        }
    }
}

/// Embedded in `ADWState.orchestrator_state`; the resumable record of one
/// workflow invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub workflow_name: String,
    pub adw_id: String,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub current_stage_index: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub stages: Vec<StageExecution>,
}

impl WorkflowExecution {
    pub fn new(workflow_name: impl Into<String>, adw_id: impl Into<String>, stage_names: &[String]) -> Self {
        Self {
            workflow_name: workflow_name.into(),
            adw_id: adw_id.into(),
            status: WorkflowStatus::Pending,
            current_stage_index: 0,
            started_at: None,
            completed_at: None,
            error: None,
            stages: stage_names.iter().map(|s| StageExecution::new(s.clone())).collect(),
        }
    }

    /// A workflow is resumable when it previously failed or was paused
    /// partway through, rather than starting fresh.
    pub fn is_resumable(&self) -> bool {
        matches!(self.status, WorkflowStatus::Failed | WorkflowStatus::Paused)
            && self.current_stage_index < self.stages.len()
    }

    pub fn completed_stage_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .map(|s| s.stage_name.clone())
            .collect()
    }

    pub fn pending_stage_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .filter(|s| matches!(s.status, StageStatus::Pending | StageStatus::Running))
            .map(|s| s.stage_name.clone())
            .collect()
    }
}

/// The bundle handed to every `Stage` method. Not persisted directly; lives
/// only for the duration of one stage invocation.
pub struct StageContext {
    pub adw_id: String,
    pub issue_number: Option<i64>,
    pub state: ADWState,
    pub worktree_path: String,
    pub config: HashMap<String, Value>,
    pub previous_stage: Option<String>,
    pub stage_index: usize,
    pub total_stages: usize,
    pub completed_stages: Vec<String>,
    pub skipped_stages: Vec<String>,
    pub stage_model: Option<String>,
}

/// What a stage's `execute` hands back to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub message: String,
    pub error: Option<String>,
    #[serde(default)]
    pub artifacts: HashMap<String, Value>,
}

impl StageOutcome {
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Completed,
            message: message.into(),
            error: None,
            artifacts: HashMap::new(),
        }
    }

    pub fn failed(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            message: message.into(),
            error: Some(error.into()),
            artifacts: HashMap::new(),
        }
    }

    pub fn with_artifact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.artifacts.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_class_strips_leading_slash() {
        assert_eq!(IssueClass::Feature.as_str(), "/feature");
        assert_eq!(IssueClass::Feature.stripped(), "feature");
    }

    #[test]
    fn append_adw_name_is_idempotent() {
        let mut state = ADWState::new("a1b2c3d4");
        state.append_adw_name("dynamic_plan_build");
        state.append_adw_name("dynamic_plan_build");
        assert_eq!(state.all_adws, vec!["dynamic_plan_build".to_string()]);
    }

    #[test]
    fn workflow_execution_round_trips_through_json() {
        let exec = WorkflowExecution::new(
            "dynamic_plan_build",
            "a1b2c3d4",
            &["plan".to_string(), "build".to_string()],
        );
        let json = serde_json::to_string(&exec).unwrap();
        let back: WorkflowExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(back.workflow_name, exec.workflow_name);
        assert_eq!(back.stages.len(), exec.stages.len());
        assert_eq!(back.current_stage_index, exec.current_stage_index);
    }

    #[test]
    fn resumable_only_when_failed_or_paused_within_bounds() {
        let mut exec = WorkflowExecution::new("w", "a1b2c3d4", &["plan".to_string(), "build".to_string()]);
        assert!(!exec.is_resumable());
        exec.status = WorkflowStatus::Failed;
        exec.current_stage_index = 1;
        assert!(exec.is_resumable());
        exec.current_stage_index = 2;
        assert!(!exec.is_resumable());
    }
}
