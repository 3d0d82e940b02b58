//! Router assembly and the `/ws/trigger` WebSocket upgrade handler.
//! Grounded on `websocket_manager.py`'s connection loop, reshaped around
//! axum's `WebSocketUpgrade` extractor.

use crate::broadcast::SubscriptionFilter;
use crate::http_api::{self, AppState};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/adws/list", get(http_api::list_adws))
        .route("/api/adws/{adw_id}", get(http_api::get_adw).delete(http_api::delete_adw))
        .route("/api/adws/{adw_id}/plan", get(http_api::get_adw_plan))
        .route("/api/worktree/open/{adw_id}", post(http_api::open_worktree))
        .route("/api/codebase/open/{adw_id}", post(http_api::open_codebase))
        .route("/api/stage-event", post(http_api::stage_event))
        .route("/api/agent-state-update", post(http_api::agent_state_update))
        .route("/healthz", get(crate::metrics::healthz))
        .route("/metrics", get(crate::metrics::metrics))
        .route("/ws/trigger", get(ws_trigger))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ws_trigger(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let (conn_id, mut rx) = state.broadcast.connect(None);

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.broadcast.record_activity(conn_id);
                        if let Some(reply) = handle_client_message(&state, conn_id, &text) {
                            if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                }
            }
            broadcasted = rx.recv() => {
                match broadcasted {
                    Ok(value) => {
                        if !state.broadcast.should_deliver(conn_id, &value) {
                            continue;
                        }
                        if socket.send(Message::Text(value.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!(conn_id, skipped = n, "websocket receiver lagged, dropping backlog");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    state.broadcast.disconnect(conn_id);
}

/// Client-originated control messages: `ping`/`ticket_notification` get an
/// ack, `subscribe`/`update_filter`/`unsubscribe` adjust the connection's
/// delivery filter, anything else unknown gets an `error` envelope back.
fn handle_client_message(state: &AppState, conn_id: u64, text: &str) -> Option<Value> {
    let parsed: Value = serde_json::from_str(text).ok()?;
    let msg_type = parsed.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match msg_type {
        "ping" => Some(json!({ "type": "pong", "data": { "timestamp": chrono::Utc::now().to_rfc3339() } })),
        "ticket_notification" => Some(json!({
            "type": "ticket_notification_response",
            "data": { "received": true, "timestamp": chrono::Utc::now().to_rfc3339() }
        })),
        "subscribe" | "update_filter" => {
            let data = parsed.get("data").cloned().unwrap_or(Value::Null);
            match serde_json::from_value::<SubscriptionFilter>(data) {
                Ok(filter) => {
                    state.broadcast.set_filter(conn_id, filter);
                    Some(json!({ "type": "subscribed", "data": { "timestamp": chrono::Utc::now().to_rfc3339() } }))
                }
                Err(e) => Some(crate::events::error(format!("invalid subscription filter: {e}")).to_wire()),
            }
        }
        "unsubscribe" => {
            state.broadcast.clear_filter(conn_id);
            Some(json!({ "type": "unsubscribed", "data": { "timestamp": chrono::Utc::now().to_rfc3339() } }))
        }
        "" => Some(crate::events::error("message missing a 'type' field").to_wire()),
        other => Some(crate::events::error(format!("unknown message type: {other}")).to_wire()),
    }
}
