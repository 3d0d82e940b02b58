//! Creates, validates, and removes the isolated git working directories
//! under `trees/<adw_id>/` that each workflow instance runs inside.

use crate::errors::{WorktreeError, WorktreeInvalidReason, WorktreeResult};
use crate::models::ADWState;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

const WEBSOCKET_PORT_BASE: u16 = 8500;
const FRONTEND_PORT_BASE: u16 = 9200;
const PORT_RANGE_WIDTH: u16 = 15;

/// The deterministic fallback port pair used when no reverse proxy is
/// running in front of the worktree's backend/frontend processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocation {
    pub websocket_port: u16,
    pub frontend_port: u16,
}

/// `base36(adw_id[:8]) mod 15`, offsetting into a reserved 15-wide port
/// range. A non-alphanumeric-after-filtering `adw_id` falls back to
/// hashing the whole id rather than failing.
pub fn allocate_ports(adw_id: &str) -> PortAllocation {
    let filtered: String = adw_id
        .chars()
        .take(8)
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    let offset = if filtered.is_empty() {
        let hash: u32 = adw_id.bytes().fold(0u32, |acc, b| {
            acc.wrapping_mul(31).wrapping_add(b as u32)
        });
        (hash % PORT_RANGE_WIDTH as u32) as u16
    } else {
        let value = u64::from_str_radix(&filtered, 36).unwrap_or_else(|_| {
            filtered.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
        });
        (value % PORT_RANGE_WIDTH as u64) as u16
    };

    PortAllocation {
        websocket_port: WEBSOCKET_PORT_BASE + offset,
        frontend_port: FRONTEND_PORT_BASE + offset,
    }
}

pub struct WorktreeManager {
    repo_root: PathBuf,
}

impl WorktreeManager {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    fn worktree_path(&self, adw_id: &str) -> PathBuf {
        self.repo_root.join("trees").join(adw_id)
    }

    /// Creates `trees/<adw_id>/`, fetches `origin` (a failure there is a
    /// warning, not an abort), then `git worktree add -b <branch> <path> main`.
    /// Retries without `-b` if the branch already exists. If the directory
    /// already exists on disk, returns its existing path with a warning
    /// instead of re-running `git worktree add`.
    pub async fn create(&self, adw_id: &str, branch_name: &str) -> WorktreeResult<PathBuf> {
        let path = self.worktree_path(adw_id);

        if path.exists() {
            warn!(adw_id, path = %path.display(), "worktree directory already exists, reusing");
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(WorktreeError::IoError)?;
        }

        let fetch = Command::new("git")
            .args(["fetch", "origin"])
            .current_dir(&self.repo_root)
            .output()
            .await;
        match fetch {
            Ok(output) if !output.status.success() => {
                warn!(
                    adw_id,
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "git fetch origin failed, continuing anyway"
                );
            }
            Err(e) => warn!(adw_id, error = %e, "git fetch origin failed to spawn, continuing anyway"),
            _ => {}
        }

        let add = Command::new("git")
            .args([
                "worktree",
                "add",
                "-b",
                branch_name,
                &path.to_string_lossy(),
                "main",
            ])
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(WorktreeError::IoError)?;

        if add.status.success() {
            info!(adw_id, branch_name, "created worktree");
            return Ok(path);
        }

        let stderr = String::from_utf8_lossy(&add.stderr);
        if !stderr.contains("already exists") {
            return Err(WorktreeError::GitFailed(stderr.to_string()));
        }

        let retry = Command::new("git")
            .args(["worktree", "add", &path.to_string_lossy(), branch_name])
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(WorktreeError::IoError)?;

        if retry.status.success() {
            info!(adw_id, branch_name, "created worktree for existing branch");
            Ok(path)
        } else {
            Err(WorktreeError::GitFailed(
                String::from_utf8_lossy(&retry.stderr).to_string(),
            ))
        }
    }

    /// Three-way check: the state has a `worktree_path`, the directory
    /// exists, and `git worktree list` mentions the path.
    pub async fn validate(&self, state: &ADWState) -> WorktreeResult<()> {
        let Some(worktree_path) = &state.worktree_path else {
            return Err(WorktreeError::Invalid(WorktreeInvalidReason::NoPath));
        };

        if !Path::new(worktree_path).exists() {
            return Err(WorktreeError::Invalid(WorktreeInvalidReason::MissingDir));
        }

        let list = Command::new("git")
            .args(["worktree", "list"])
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(WorktreeError::IoError)?;

        let listing = String::from_utf8_lossy(&list.stdout);
        if !listing.contains(worktree_path.as_str()) {
            return Err(WorktreeError::Invalid(WorktreeInvalidReason::NotRegistered));
        }

        Ok(())
    }

    /// `git worktree remove --force`, then best-effort `rm -rf` if git
    /// failed and the directory still exists, then `git worktree prune`.
    pub async fn remove(&self, adw_id: &str) -> WorktreeResult<()> {
        let path = self.worktree_path(adw_id);

        let remove = Command::new("git")
            .args(["worktree", "remove", "--force", &path.to_string_lossy()])
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(WorktreeError::IoError)?;

        if !remove.status.success() && path.exists() {
            warn!(adw_id, "git worktree remove failed, falling back to rm -rf");
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(adw_id, error = %e, "rm -rf of worktree directory also failed");
            }
        }

        let _ = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.repo_root)
            .output()
            .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_allocation_is_deterministic() {
        let a = allocate_ports("a1b2c3d4");
        let b = allocate_ports("a1b2c3d4");
        assert_eq!(a, b);
        assert!(a.websocket_port >= WEBSOCKET_PORT_BASE);
        assert!(a.websocket_port < WEBSOCKET_PORT_BASE + PORT_RANGE_WIDTH);
        assert!(a.frontend_port >= FRONTEND_PORT_BASE);
        assert!(a.frontend_port < FRONTEND_PORT_BASE + PORT_RANGE_WIDTH);
    }

    #[test]
    fn non_alphanumeric_adw_id_falls_back_to_whole_id_hash() {
        let allocation = allocate_ports("!!!!!!!!");
        assert!(allocation.websocket_port >= WEBSOCKET_PORT_BASE);
        assert!(allocation.websocket_port < WEBSOCKET_PORT_BASE + PORT_RANGE_WIDTH);
    }

    #[tokio::test]
    async fn validate_fails_with_no_path_when_state_has_none() {
        let manager = WorktreeManager::new(".");
        let state = ADWState::new("a1b2c3d4");
        let err = manager.validate(&state).await.unwrap_err();
        assert!(matches!(
            err,
            WorktreeError::Invalid(WorktreeInvalidReason::NoPath)
        ));
    }

    #[tokio::test]
    async fn validate_fails_with_missing_dir_for_nonexistent_path() {
        let manager = WorktreeManager::new(".");
        let mut state = ADWState::new("a1b2c3d4");
        state.worktree_path = Some("/nonexistent/path/xyz".to_string());
        let err = manager.validate(&state).await.unwrap_err();
        assert!(matches!(
            err,
            WorktreeError::Invalid(WorktreeInvalidReason::MissingDir)
        ));
    }
}
