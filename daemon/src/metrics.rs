//! `/healthz` and `/metrics` endpoints: liveness and a small Prometheus
//! text-exposition surface over the broadcast manager's connection count
//! and process uptime. Grounded on `server/core/logger.py`'s role as the
//! daemon's ambient observability surface -- there is no metrics module in
//! the original, so this follows axum's conventional plain-text exposition
//! shape rather than pulling in a full `metrics`/`prometheus` crate for two
//! gauges.

use crate::http_api::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();
static STAGE_COMPLETED_TOTAL: AtomicI64 = AtomicI64::new(0);
static STAGE_FAILED_TOTAL: AtomicI64 = AtomicI64::new(0);

pub fn record_stage_outcome(failed: bool) {
    if failed {
        STAGE_FAILED_TOTAL.fetch_add(1, Ordering::Relaxed);
    } else {
        STAGE_COMPLETED_TOTAL.fetch_add(1, Ordering::Relaxed);
    }
}

fn uptime_secs() -> u64 {
    START.get_or_init(Instant::now).elapsed().as_secs()
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "active_connections": state.broadcast.connection_count(),
        "uptime_secs": uptime_secs(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        "# HELP adw_daemon_uptime_seconds Seconds since the daemon process started.\n\
         # TYPE adw_daemon_uptime_seconds counter\n\
         adw_daemon_uptime_seconds {}\n\
         # HELP adw_daemon_active_connections Currently connected WebSocket clients.\n\
         # TYPE adw_daemon_active_connections gauge\n\
         adw_daemon_active_connections {}\n\
         # HELP adw_daemon_stage_completed_total Stage executions that completed successfully.\n\
         # TYPE adw_daemon_stage_completed_total counter\n\
         adw_daemon_stage_completed_total {}\n\
         # HELP adw_daemon_stage_failed_total Stage executions that failed.\n\
         # TYPE adw_daemon_stage_failed_total counter\n\
         adw_daemon_stage_failed_total {}\n",
        uptime_secs(),
        state.broadcast.connection_count(),
        STAGE_COMPLETED_TOTAL.load(Ordering::Relaxed),
        STAGE_FAILED_TOTAL.load(Ordering::Relaxed),
    );
    ([("content-type", "text/plain; version=0.0.4")], body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_is_monotonic_non_negative() {
        let a = uptime_secs();
        let b = uptime_secs();
        assert!(b >= a);
    }
}
