//! The typed event envelope broadcast to WebSocket clients: lifecycle
//! events (mirroring the orchestrator's own `OrchestratorEvent`), agent
//! events (derived from tailed JSONL), and transport events (heartbeats,
//! stage transitions, errors).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

/// Every event broadcast over `/ws/trigger` takes the wire shape
/// `{"type": <kind>, "data": {...}}`, with `data.timestamp` always present.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: &'static str,
    pub data: Value,
}

impl Event {
    pub fn new(kind: &'static str, mut data: Value) -> Self {
        if let Value::Object(map) = &mut data {
            map.entry("timestamp").or_insert_with(|| json!(Utc::now().to_rfc3339()));
        }
        Self { kind, data }
    }

    /// The exact `{type, data}` envelope sent on the wire.
    pub fn to_wire(&self) -> Value {
        json!({ "type": self.kind, "data": self.data })
    }
}

// ===== Lifecycle events (orchestrator stage/workflow transitions) =====

#[allow(clippy::too_many_arguments)]
pub fn stage_transition(
    adw_id: &str,
    workflow_name: &str,
    from_stage: &str,
    to_stage: &str,
    message: Option<&str>,
    timestamp: DateTime<Utc>,
) -> Event {
    Event::new(
        "stage_transition",
        json!({
            "adw_id": adw_id,
            "workflow_name": workflow_name,
            "from_stage": from_stage,
            "to_stage": to_stage,
            "message": message,
            "timestamp": timestamp.to_rfc3339(),
        }),
    )
}

pub fn heartbeat(active_connections: usize) -> Event {
    Event::new(
        "heartbeat",
        json!({
            "active_connections": active_connections,
            "server_time": Utc::now().to_rfc3339(),
        }),
    )
}

pub fn error(message: impl Into<String>) -> Event {
    Event::new("error", json!({ "message": message.into() }))
}

// ===== Agent events (derived from tailed JSONL, see log_monitor) =====

pub fn thinking_block(adw_id: &str, content: &str) -> Event {
    Event::new("thinking_block", json!({ "adw_id": adw_id, "content": content }))
}

pub fn text_block(adw_id: &str, content: &str) -> Event {
    Event::new("text_block", json!({ "adw_id": adw_id, "content": content }))
}

pub fn tool_use_pre(adw_id: &str, tool_name: &str, tool_input: &Value, tool_use_id: Option<&str>) -> Event {
    Event::new(
        "tool_use_pre",
        json!({
            "adw_id": adw_id,
            "tool_name": tool_name,
            "tool_input": tool_input,
            "tool_use_id": tool_use_id,
        }),
    )
}

pub fn tool_use_post(adw_id: &str, tool_name: &str, tool_output: &Value, tool_use_id: Option<&str>) -> Event {
    Event::new(
        "tool_use_post",
        json!({
            "adw_id": adw_id,
            "tool_name": tool_name,
            "tool_output": tool_output,
            "tool_use_id": tool_use_id,
        }),
    )
}

pub fn file_changed(adw_id: &str, path: &str) -> Event {
    Event::new("file_changed", json!({ "adw_id": adw_id, "path": path }))
}

pub fn agent_log(adw_id: &str, level: &str, message: &str, extra: Value) -> Event {
    let mut data = json!({ "adw_id": adw_id, "level": level, "message": message });
    if let (Value::Object(map), Value::Object(extra_map)) = (&mut data, extra) {
        for (k, v) in extra_map {
            map.insert(k, v);
        }
    }
    Event::new("agent_log", data)
}

/// The raw-data passthrough for invalid JSONL lines -- the stream must stay
/// lossless rather than silently dropping a malformed line.
pub fn parse_error(adw_id: &str, raw_line: &str, error: &str) -> Event {
    Event::new(
        "agent_log",
        json!({
            "adw_id": adw_id,
            "level": "ERROR",
            "message": "failed to parse agent log line",
            "raw_data": { "parse_error": error, "line": raw_line },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_exactly_type_and_data_keys() {
        let event = heartbeat(3);
        let wire = event.to_wire();
        let obj = wire.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj.contains_key("type"));
        assert!(obj.contains_key("data"));
        assert!(obj["data"]["timestamp"].is_string());
    }

    #[test]
    fn timestamp_is_not_overwritten_when_already_present() {
        let event = stage_transition("a1b2c3d4", "w", "plan", "build", None, Utc::now());
        let ts = event.data["timestamp"].clone();
        let event2 = Event::new("stage_transition", event.data.clone());
        assert_eq!(event2.data["timestamp"], ts);
    }
}
