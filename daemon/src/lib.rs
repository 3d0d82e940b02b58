//! ADW Daemon: the long-running HTTP/WebSocket process that fronts the
//! orchestrator's state store for the web dashboard -- ticket discovery,
//! stage-transition broadcast, worktree/codebase launch helpers, and
//! live agent log tailing.
//!
//! Like `adw-core`, this crate does not install the global tracing
//! subscriber; only `main.rs` does.

pub mod broadcast;
pub mod config;
pub mod events;
pub mod http_api;
pub mod log_monitor;
pub mod metrics;
pub mod server;

pub use broadcast::BroadcastManager;
pub use config::DaemonConfig;
pub use events::Event;
pub use http_api::AppState;
pub use log_monitor::{AgentLogMonitor, MonitorRegistry};
pub use server::build_router;

/// Daemon version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
