//! Tails `agents/<adw_id>/**/*.jsonl` files written by the agent CLI and
//! maps each parsed line to a typed WebSocket event, per the priority rules
//! below. Grounded on the content-block-derived-subtype logic exercised by
//! `test_parse_jsonl_logs.py` and the `hook_response`/`init`/`error` system
//! event handling described for the log monitor.

use crate::broadcast::BroadcastManager;
use crate::events::{self, Event};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio::sync::mpsc;
use tracing::{info, warn};

const TRUNCATE_AT: usize = 2000;
const TRUNCATE_SUFFIX: &str = "... [truncated]";

/// Parses one JSONL line into the event it maps to, per spec priority:
/// thinking > tool_use > text for assistant messages; tool_result for user
/// messages; system init/hook_response/error as `agent_log`; anything whose
/// top-level `type` already names a target event passes through unchanged.
pub fn parse_line(adw_id: &str, line: &str) -> Event {
    let parsed: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return events::parse_error(adw_id, line, &e.to_string()),
    };

    let top_type = parsed.get("type").and_then(|v| v.as_str()).unwrap_or("");

    // Back-compat passthrough: already-typed events skip re-derivation.
    let passthrough_kind = match top_type {
        "thinking_block" => Some("thinking_block"),
        "tool_use_pre" => Some("tool_use_pre"),
        "tool_use_post" => Some("tool_use_post"),
        "text_block" => Some("text_block"),
        "file_changed" => Some("file_changed"),
        "agent_log" => Some("agent_log"),
        _ => None,
    };
    if let Some(kind) = passthrough_kind {
        let mut data = parsed.get("data").cloned().unwrap_or(parsed.clone());
        if let Value::Object(map) = &mut data {
            map.entry("adw_id").or_insert_with(|| Value::String(adw_id.to_string()));
        }
        return Event::new(kind, data);
    }

    match top_type {
        "assistant" => parse_assistant(adw_id, &parsed),
        "user" => parse_user(adw_id, &parsed),
        "system" => parse_system(adw_id, &parsed),
        _ => events::agent_log(adw_id, "INFO", "unrecognized log entry type", parsed.clone()),
    }
}

fn content_blocks(parsed: &Value) -> Vec<Value> {
    parsed
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default()
}

fn parse_assistant(adw_id: &str, parsed: &Value) -> Event {
    let blocks = content_blocks(parsed);

    if let Some(thinking) = blocks.iter().find(|b| b.get("type").and_then(|t| t.as_str()) == Some("thinking")) {
        let content = thinking.get("thinking").and_then(|t| t.as_str()).unwrap_or_default();
        return events::thinking_block(adw_id, content);
    }

    if let Some(tool_use) = blocks.iter().find(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_use")) {
        let tool_name = tool_use.get("name").and_then(|n| n.as_str()).unwrap_or_default();
        let tool_input = tool_use.get("input").cloned().unwrap_or(Value::Null);
        let tool_use_id = tool_use.get("id").and_then(|i| i.as_str());
        return events::tool_use_pre(adw_id, tool_name, &tool_input, tool_use_id);
    }

    if let Some(text) = blocks.iter().find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text")) {
        let content = text.get("text").and_then(|t| t.as_str()).unwrap_or_default();
        return events::text_block(adw_id, content);
    }

    events::agent_log(adw_id, "INFO", "assistant message with no recognized content block", parsed.clone())
}

fn parse_user(adw_id: &str, parsed: &Value) -> Event {
    let blocks = content_blocks(parsed);

    if let Some(tool_result) = blocks.iter().find(|b| b.get("type").and_then(|t| t.as_str()) == Some("tool_result")) {
        let tool_use_result = parsed.get("tool_use_result");
        let (tool_name, tool_use_id) = match tool_use_result {
            Some(Value::Object(obj)) => (
                obj.get("tool_name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                obj.get("tool_use_id").and_then(|v| v.as_str()),
            ),
            _ => (String::new(), tool_result.get("tool_use_id").and_then(|v| v.as_str())),
        };

        let raw_output = tool_result.get("content").cloned().unwrap_or(Value::Null);
        let output_string = match &raw_output {
            Value::String(s) => s.clone(),
            Value::Array(_) => serde_json::to_string(&raw_output).unwrap_or_default(),
            other => other.to_string(),
        };
        let truncated = truncate(&output_string);

        return events::tool_use_post(adw_id, &tool_name, &Value::String(truncated), tool_use_id);
    }

    events::agent_log(adw_id, "INFO", "user message with no tool_result content block", parsed.clone())
}

fn parse_system(adw_id: &str, parsed: &Value) -> Event {
    let subtype = parsed.get("subtype").and_then(|s| s.as_str()).unwrap_or("");

    match subtype {
        "init" => {
            let model = parsed.get("model").and_then(|m| m.as_str()).unwrap_or("unknown");
            let tool_count = parsed.get("tools").and_then(|t| t.as_array()).map(|a| a.len()).unwrap_or(0);
            events::agent_log(
                adw_id,
                "INFO",
                &format!("agent initialized with model {model}, {tool_count} tools"),
                serde_json::json!({ "model": model, "tool_count": tool_count }),
            )
        }
        "hook_response" => {
            let exit_code = parsed.get("exit_code").and_then(|e| e.as_i64()).unwrap_or(0);
            let stderr = parsed.get("stderr").and_then(|s| s.as_str()).unwrap_or("");
            let level = if exit_code != 0 || !stderr.is_empty() { "ERROR" } else { "INFO" };
            events::agent_log(adw_id, level, "hook response", serde_json::json!({ "exit_code": exit_code, "stderr": stderr }))
        }
        "error" => {
            let message = parsed.get("message").and_then(|m| m.as_str()).unwrap_or("agent error");
            events::agent_log(adw_id, "ERROR", message, Value::Null)
        }
        _ => events::agent_log(adw_id, "INFO", "system event", parsed.clone()),
    }
}

fn truncate(output: &str) -> String {
    if output.chars().count() <= TRUNCATE_AT {
        output.to_string()
    } else {
        let prefix: String = output.chars().take(TRUNCATE_AT).collect();
        format!("{prefix}{TRUNCATE_SUFFIX}")
    }
}

/// Tails a single `.jsonl` file from its current end-of-file forward,
/// re-reading whenever the filesystem watcher reports a write, and
/// broadcasting one event per newly appended line.
struct FileTail {
    path: PathBuf,
    adw_id: String,
    offset: u64,
}

impl FileTail {
    async fn new(path: PathBuf, adw_id: String) -> std::io::Result<Self> {
        let len = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        Ok(Self { path, adw_id, offset: len })
    }

    async fn read_new_lines(&mut self, broadcast: &BroadcastManager) {
        let Ok(mut file) = File::open(&self.path).await else { return };
        let Ok(len) = file.metadata().await.map(|m| m.len()) else { return };
        if len < self.offset {
            // File was truncated/rotated; restart from the top.
            self.offset = 0;
        }
        if file.seek(SeekFrom::Start(self.offset)).await.is_err() {
            return;
        }

        let mut reader = BufReader::new(file);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(n) => {
                    self.offset += n as u64;
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    broadcast.broadcast(parse_line(&self.adw_id, trimmed));
                }
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "error reading jsonl tail");
                    break;
                }
            }
        }
    }
}

/// Watches `agents/<adw_id>/` for `.jsonl` files (created now or later) and
/// tails each one, forwarding parsed events to the broadcast manager. Runs
/// as a background task for the lifetime of one workflow; dropping the
/// returned handle stops the watch.
pub struct AgentLogMonitor {
    adw_id: String,
    dir: PathBuf,
    broadcast: Arc<BroadcastManager>,
}

impl AgentLogMonitor {
    pub fn new(adw_id: impl Into<String>, agents_dir: &Path, broadcast: Arc<BroadcastManager>) -> Self {
        let adw_id = adw_id.into();
        let dir = agents_dir.join(&adw_id);
        Self { adw_id, dir, broadcast }
    }

    /// Spawns the background watch task. Returns its `JoinHandle`; the
    /// caller may abort it when the workflow completes.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                warn!(adw_id = %self.adw_id, error = %e, "agent log monitor exited");
            }
        })
    }

    async fn run(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.ok();

        let (tx, mut rx) = mpsc::unbounded_channel::<NotifyEvent>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        })?;
        watcher.watch(&self.dir, RecursiveMode::Recursive)?;

        let mut tails: HashMap<PathBuf, FileTail> = HashMap::new();

        // Pick up files that already exist before the watcher started.
        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                    if let Ok(tail) = FileTail::new(path.clone(), self.adw_id.clone()).await {
                        tails.insert(path, tail);
                    }
                }
            }
        }

        info!(adw_id = %self.adw_id, dir = %self.dir.display(), "agent log monitor watching");

        while let Some(event) = rx.recv().await {
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                continue;
            }
            for path in event.paths {
                if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                    continue;
                }
                let tail = match tails.get_mut(&path) {
                    Some(t) => t,
                    None => {
                        let Ok(t) = FileTail::new(path.clone(), self.adw_id.clone()).await else { continue };
                        tails.entry(path.clone()).or_insert(t)
                    }
                };
                tail.read_new_lines(&self.broadcast).await;
            }
        }

        Ok(())
    }
}

/// Tracks which ADWs currently have a running `AgentLogMonitor`, keyed by
/// `adw_id`. `start_monitoring`/`stop_monitoring` are idempotent: starting
/// twice or stopping a non-monitored id is a no-op that reports `false`
/// rather than double-registering or erroring.
pub struct MonitorRegistry {
    agents_dir: PathBuf,
    broadcast: Arc<BroadcastManager>,
    handles: dashmap::DashMap<String, tokio::task::JoinHandle<()>>,
}

impl MonitorRegistry {
    pub fn new(agents_dir: PathBuf, broadcast: Arc<BroadcastManager>) -> Arc<Self> {
        Arc::new(Self { agents_dir, broadcast, handles: dashmap::DashMap::new() })
    }

    /// Starts tailing `agents/<adw_id>/` if not already being monitored.
    /// Returns `true` if a monitor was started, `false` if one was already
    /// running for this `adw_id`.
    pub fn start_monitoring(&self, adw_id: &str) -> bool {
        if self.handles.contains_key(adw_id) {
            return false;
        }
        let monitor = AgentLogMonitor::new(adw_id.to_string(), &self.agents_dir, self.broadcast.clone());
        let handle = monitor.spawn();
        self.handles.insert(adw_id.to_string(), handle);
        true
    }

    /// Stops the monitor for `adw_id`, if any. Returns `true` if one was
    /// running and got aborted, `false` if nothing was running.
    pub fn stop_monitoring(&self, adw_id: &str) -> bool {
        match self.handles.remove(adw_id) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_monitoring(&self, adw_id: &str) -> bool {
        self.handles.contains_key(adw_id)
    }

    pub fn active_monitors(&self) -> Vec<String> {
        self.handles.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_thinking_takes_priority_over_tool_use() {
        let line = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "thinking", "thinking": "let me think"},
                {"type": "tool_use", "name": "Read", "input": {}}
            ]}
        })
        .to_string();
        let event = parse_line("a1b2c3d4", &line);
        assert_eq!(event.kind, "thinking_block");
        assert_eq!(event.data["content"], "let me think");
    }

    #[test]
    fn assistant_tool_use_takes_priority_over_text() {
        let line = json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "text", "text": "I'll read the file."},
                {"type": "tool_use", "name": "Read", "input": {"file_path": "x.rs"}}
            ]}
        })
        .to_string();
        let event = parse_line("a1b2c3d4", &line);
        assert_eq!(event.kind, "tool_use_pre");
        assert_eq!(event.data["tool_name"], "Read");
    }

    #[test]
    fn user_tool_result_is_truncated_at_2000_chars() {
        let long_output = "x".repeat(2500);
        let line = json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "content": long_output}]},
            "tool_use_result": {"tool_name": "Bash"}
        })
        .to_string();
        let event = parse_line("a1b2c3d4", &line);
        assert_eq!(event.kind, "tool_use_post");
        let output = event.data["tool_output"].as_str().unwrap();
        assert_eq!(output.len(), TRUNCATE_AT + TRUNCATE_SUFFIX.len());
        assert!(output.ends_with(TRUNCATE_SUFFIX));
    }

    #[test]
    fn user_tool_result_list_output_is_json_serialized() {
        let line = json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "content": ["a", "b"]}]},
        })
        .to_string();
        let event = parse_line("a1b2c3d4", &line);
        let output = event.data["tool_output"].as_str().unwrap();
        assert_eq!(output, r#"["a","b"]"#);
    }

    #[test]
    fn system_init_reports_model_and_tool_count() {
        let line = json!({"type": "system", "subtype": "init", "model": "claude-opus", "tools": ["Read", "Write"]}).to_string();
        let event = parse_line("a1b2c3d4", &line);
        assert_eq!(event.kind, "agent_log");
        assert_eq!(event.data["model"], "claude-opus");
        assert_eq!(event.data["tool_count"], 2);
    }

    #[test]
    fn system_hook_response_error_level_on_nonzero_exit() {
        let line = json!({"type": "system", "subtype": "hook_response", "exit_code": 1, "stderr": "boom"}).to_string();
        let event = parse_line("a1b2c3d4", &line);
        assert_eq!(event.data["level"], "ERROR");
    }

    #[test]
    fn invalid_json_line_becomes_lossless_parse_error_event() {
        let event = parse_line("a1b2c3d4", "not json {{{");
        assert_eq!(event.kind, "agent_log");
        assert!(event.data["raw_data"]["parse_error"].is_string());
        assert_eq!(event.data["raw_data"]["line"], "not json {{{");
    }

    #[test]
    fn system_error_subtype_is_error_level() {
        let line = json!({"type": "system", "subtype": "error", "message": "agent crashed"}).to_string();
        let event = parse_line("a1b2c3d4", &line);
        assert_eq!(event.kind, "agent_log");
        assert_eq!(event.data["level"], "ERROR");
        assert_eq!(event.data["message"], "agent crashed");
    }

    #[tokio::test]
    async fn monitor_registry_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MonitorRegistry::new(dir.path().to_path_buf(), BroadcastManager::new());
        assert!(registry.start_monitoring("a1b2c3d4"));
        assert!(!registry.start_monitoring("a1b2c3d4"));
        assert!(registry.is_monitoring("a1b2c3d4"));
        assert_eq!(registry.active_monitors(), vec!["a1b2c3d4".to_string()]);
    }

    #[tokio::test]
    async fn monitor_registry_stop_reports_whether_anything_was_running() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MonitorRegistry::new(dir.path().to_path_buf(), BroadcastManager::new());
        assert!(!registry.stop_monitoring("a1b2c3d4"));
        registry.start_monitoring("a1b2c3d4");
        assert!(registry.stop_monitoring("a1b2c3d4"));
        assert!(!registry.is_monitoring("a1b2c3d4"));
    }
}
