//! The HTTP surface: list/detail/plan/delete/open endpoints over the
//! state store, the `/api/stage-event` back-compat endpoint, and
//! `/api/agent-state-update`, all grounded on `server/api/adws.py` and
//! `adws/adw_tests/test_stage_event_endpoint.py`.

use crate::broadcast::BroadcastManager;
use crate::events;
use crate::log_monitor::MonitorRegistry;
use adw_core::{ApiError, Discovery, VALID_STAGES};
use adw_core::StateStore;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DaemonConfig;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub discovery: Arc<Discovery>,
    pub broadcast: Arc<BroadcastManager>,
    pub config: Arc<DaemonConfig>,
    pub monitors: Arc<MonitorRegistry>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// `^[A-Za-z0-9]{8}$`, checked without pulling in a regex dependency for
/// one eight-character alphanumeric test.
fn validate_adw_id(adw_id: &str) -> Result<(), ApiError> {
    if adw_id.len() == 8 && adw_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "Invalid ADW ID format: {adw_id}. Must be 8 alphanumeric characters."
        )))
    }
}

// ===== GET /api/adws/list =====

pub async fn list_adws(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summaries = state.discovery.list_active().await?;
    Ok(Json(json!({ "adws": summaries })))
}

// ===== GET /api/adws/{adw_id} =====

pub async fn get_adw(State(state): State<AppState>, AxumPath(adw_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    validate_adw_id(&adw_id)?;
    let row = state
        .store
        .load(&adw_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ADW ID '{adw_id}' not found")))?;
    Ok(Json(serde_json::to_value(row).map_err(|e| ApiError::Internal(e.to_string()))?))
}

// ===== GET /api/adws/{adw_id}/plan =====

pub async fn get_adw_plan(State(state): State<AppState>, AxumPath(adw_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    validate_adw_id(&adw_id)?;
    state
        .store
        .load(&adw_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ADW ID '{adw_id}' not found")))?;

    let relative_plan_path = format!("agents/{adw_id}/sdlc_planner/plan.md");
    let plan_file = state.config.agents_dir().join(&adw_id).join("sdlc_planner").join("plan.md");

    let plan_content = tokio::fs::read_to_string(&plan_file)
        .await
        .map_err(|_| ApiError::NotFound(format!("Plan file not found for ADW ID '{adw_id}' at path: {}", plan_file.display())))?;

    Ok(Json(json!({ "plan_content": plan_content, "plan_file": relative_plan_path })))
}

// ===== DELETE /api/adws/{adw_id} =====

pub async fn delete_adw(State(state): State<AppState>, AxumPath(adw_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    validate_adw_id(&adw_id)?;

    let affected = state.store.soft_delete(&adw_id).await?;
    if affected == 0 {
        return Err(ApiError::NotFound(format!("ADW ID '{adw_id}' not found")));
    }

    state.monitors.stop_monitoring(&adw_id);

    let tree_path = state.config.trees_dir().join(&adw_id);
    if tree_path.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&tree_path).await {
            warn!(adw_id, error = %e, "failed to remove worktree directory on delete");
        }
    }

    info!(adw_id, "soft-deleted ADW");
    state.broadcast.broadcast(events::Event::new("agent_deleted", json!({ "adw_id": adw_id })));

    Ok(Json(json!({ "success": true, "db_updated": true })))
}

// ===== POST /api/worktree/open/{adw_id}, POST /api/codebase/open/{adw_id} =====
// Best-effort, non-critical: launching a terminal/tmux session or editor is
// a shell-integration concern treated as an external collaborator. This
// endpoint validates the ADW and reports the session name it would use /
// attempted to create; a failure to actually spawn tmux or the editor never
// turns into an error response.

#[derive(Serialize)]
struct OpenResponse {
    success: bool,
    adw_id: String,
    tmux_session: String,
    window_name: String,
}

async fn open_common(state: &AppState, adw_id: &str, window_name: &str) -> Result<(String, PathBuf), ApiError> {
    validate_adw_id(adw_id)?;
    let row = state
        .store
        .load(adw_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("ADW ID '{adw_id}' not found")))?;
    let worktree_path = row
        .worktree_path
        .ok_or_else(|| ApiError::NotFound("Worktree path not found".to_string()))?;

    let session = format!("adw-{adw_id}");
    let has_session = tokio::process::Command::new("tmux")
        .args(["has-session", "-t", &session])
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);

    if !has_session {
        let _ = tokio::process::Command::new("tmux")
            .args(["new-session", "-d", "-s", &session, "-c", &worktree_path])
            .output()
            .await;
    } else {
        let _ = tokio::process::Command::new("tmux")
            .args(["new-window", "-t", &session, "-n", window_name, "-c", &worktree_path])
            .output()
            .await;
    }

    Ok((session, PathBuf::from(worktree_path)))
}

pub async fn open_worktree(State(state): State<AppState>, AxumPath(adw_id): AxumPath<String>) -> Result<Json<OpenResponse>, ApiError> {
    let (session, _path) = open_common(&state, &adw_id, "worktree").await?;
    Ok(Json(OpenResponse { success: true, adw_id, tmux_session: session, window_name: "worktree".to_string() }))
}

pub async fn open_codebase(State(state): State<AppState>, AxumPath(adw_id): AxumPath<String>) -> Result<Json<OpenResponse>, ApiError> {
    let (session, path) = open_common(&state, &adw_id, "codebase").await?;

    let editor = std::env::var("IDE_PREFERENCE").unwrap_or_else(|_| "code".to_string());
    let editor_bin = match editor.as_str() {
        "cursor" => "cursor",
        _ => "code",
    };
    let _ = tokio::process::Command::new(editor_bin).arg(&path).output().await;

    Ok(Json(OpenResponse { success: true, adw_id, tmux_session: session, window_name: "codebase".to_string() }))
}

// ===== POST /api/stage-event =====

#[derive(Deserialize)]
#[serde(untagged)]
pub enum StageEventRequest {
    Direct {
        adw_id: String,
        workflow_name: Option<String>,
        from_stage: String,
        to_stage: String,
        message: Option<String>,
    },
    Orchestrator {
        adw_id: String,
        event_type: String,
        workflow_name: Option<String>,
        stage_name: Option<String>,
        previous_stage: Option<String>,
        next_stage: Option<String>,
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        skip_reason: Option<String>,
        #[serde(default)]
        duration_ms: Option<i64>,
    },
}

/// Maps an orchestrator event type to `(from_stage, to_stage)`, per the
/// table in spec §4.7. `None` means "no transition emitted".
fn map_event_type(
    event_type: &str,
    stage_name: Option<&str>,
    previous_stage: Option<&str>,
    next_stage: Option<&str>,
) -> Option<(String, Option<String>)> {
    match event_type {
        "workflow_started" => Some(("backlog".to_string(), stage_name.map(|s| s.to_string()))),
        "stage_started" => Some((
            previous_stage.unwrap_or("backlog").to_string(),
            stage_name.map(|s| s.to_string()),
        )),
        "stage_completed" => next_stage.map(|next| (stage_name.unwrap_or_default().to_string(), Some(next.to_string()))),
        "workflow_completed" => Some((stage_name.unwrap_or_default().to_string(), Some("ready-to-merge".to_string()))),
        "stage_failed" | "workflow_failed" => Some((stage_name.unwrap_or_default().to_string(), Some("errored".to_string()))),
        "stage_skipped" => None,
        _ => None,
    }
}

pub async fn stage_event(
    State(state): State<AppState>,
    Json(payload): Json<StageEventRequest>,
) -> Result<Json<Value>, ApiError> {
    let (adw_id, workflow_name, from_stage, to_stage, message) = match payload {
        StageEventRequest::Direct { adw_id, workflow_name, from_stage, to_stage, message } => {
            if !VALID_STAGES.contains(&to_stage.as_str()) {
                return Err(ApiError::Validation(format!("invalid to_stage: {to_stage}")));
            }
            (adw_id, workflow_name.unwrap_or_default(), Some(from_stage), to_stage, message)
        }
        StageEventRequest::Orchestrator {
            adw_id,
            event_type,
            workflow_name,
            stage_name,
            previous_stage,
            next_stage,
            message,
            ..
        } => {
            let Some((from_stage, to_stage)) = map_event_type(
                &event_type,
                stage_name.as_deref(),
                previous_stage.as_deref(),
                next_stage.as_deref(),
            ) else {
                // Tolerate drift: unknown or no-transition event types still return 200.
                return Ok(Json(json!({ "acknowledged": true })));
            };
            let Some(to_stage) = to_stage else {
                return Ok(Json(json!({ "acknowledged": true })));
            };
            if !VALID_STAGES.contains(&to_stage.as_str()) {
                return Err(ApiError::Validation(format!("invalid to_stage: {to_stage}")));
            }
            (adw_id, workflow_name.unwrap_or_default(), Some(from_stage), to_stage, message)
        }
    };

    crate::metrics::record_stage_outcome(to_stage == "errored");

    if from_stage.as_deref() == Some("backlog") {
        state.monitors.start_monitoring(&adw_id);
    } else if to_stage == "ready-to-merge" || to_stage == "errored" {
        state.monitors.stop_monitoring(&adw_id);
    }

    let event = events::stage_transition(
        &adw_id,
        &workflow_name,
        from_stage.as_deref().unwrap_or_default(),
        &to_stage,
        message.as_deref(),
        Utc::now(),
    );
    state.broadcast.broadcast(event);

    Ok(Json(json!({ "acknowledged": true })))
}

// ===== POST /api/agent-state-update =====

#[derive(Deserialize)]
pub struct AgentStateUpdate {
    pub adw_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Agent event types are an open set (whatever the agent process emits),
/// so unlike the other constructors in `events` this wraps them generically
/// rather than matching against a fixed list of `&'static str` kinds.
pub async fn agent_state_update(State(state): State<AppState>, Json(payload): Json<AgentStateUpdate>) -> Json<Value> {
    let mut data = payload.data;
    if let Value::Object(map) = &mut data {
        map.entry("adw_id").or_insert_with(|| Value::String(payload.adw_id.clone()));
    }
    state.broadcast.broadcast_raw(&payload.event_type, data);
    Json(json!({ "acknowledged": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_adw_id_rejects_wrong_length() {
        assert!(validate_adw_id("short").is_err());
        assert!(validate_adw_id("waytoolongforthis").is_err());
    }

    #[test]
    fn validate_adw_id_rejects_special_chars() {
        assert!(validate_adw_id("test@123").is_err());
    }

    #[test]
    fn validate_adw_id_accepts_eight_alphanumeric() {
        assert!(validate_adw_id("testtest").is_ok());
        assert!(validate_adw_id("a1b2c3d4").is_ok());
    }

    #[test]
    fn map_stage_completed_with_null_next_emits_no_transition() {
        assert_eq!(map_event_type("stage_completed", Some("build"), None, None), None);
    }

    #[test]
    fn map_stage_completed_with_next_stage_maps_through() {
        let (from, to) = map_event_type("stage_completed", Some("plan"), None, Some("build")).unwrap();
        assert_eq!(from, "plan");
        assert_eq!(to, Some("build".to_string()));
    }

    #[test]
    fn map_workflow_completed_always_goes_to_ready_to_merge() {
        let (_, to) = map_event_type("workflow_completed", Some("merge"), None, None).unwrap();
        assert_eq!(to, Some("ready-to-merge".to_string()));
    }

    #[test]
    fn map_stage_skipped_emits_no_transition() {
        assert_eq!(map_event_type("stage_skipped", Some("test"), None, None), None);
    }

    #[test]
    fn map_unknown_event_type_emits_no_transition() {
        assert_eq!(map_event_type("some_future_event", Some("x"), None, None), None);
    }
}
