//! Daemon process configuration: where the database lives, where
//! per-workflow artifacts (worktrees, agent logs) live, and which address
//! the HTTP/WS server binds to.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the HTTP/WS server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    /// Repository root; `trees/<adw_id>` and `agents/<adw_id>` are resolved
    /// relative to it.
    #[serde(default = "default_repo_root")]
    pub repo_root: PathBuf,
    /// SQLite database path, relative to `repo_root` unless absolute.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Interval between WebSocket heartbeat broadcasts.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8090
}

fn default_repo_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("adws/database/agentickanban.db")
}

fn default_heartbeat_secs() -> u64 {
    30
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            bind_port: default_bind_port(),
            repo_root: default_repo_root(),
            db_path: default_db_path(),
            heartbeat_interval_secs: default_heartbeat_secs(),
        }
    }
}

impl DaemonConfig {
    pub fn agents_dir(&self) -> PathBuf {
        self.repo_root.join("agents")
    }

    pub fn trees_dir(&self) -> PathBuf {
        self.repo_root.join("trees")
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        if self.db_path.is_absolute() {
            self.db_path.clone()
        } else {
            self.repo_root.join(&self.db_path)
        }
    }
}
