//! Thin wrapper over the `git` and `gh` CLIs: commit, push, PR create/merge,
//! and conflict detection. Branch/worktree lifecycle lives in
//! [`crate::worktree`]; this module covers what stages do once inside one.

use crate::errors::{GitError, GitResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Squash,
    Merge,
    Rebase,
}

pub struct GitAdapter {
    worktree_path: PathBuf,
}

impl GitAdapter {
    pub fn new(worktree_path: impl Into<PathBuf>) -> Self {
        Self {
            worktree_path: worktree_path.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> GitResult<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.worktree_path)
            .output()
            .await
            .map_err(GitError::IoError)
    }

    /// `git add -A && git commit -m <message>`. A commit with nothing
    /// staged is not an error -- it's reported via the returned bool.
    pub async fn commit_all(&self, message: &str) -> GitResult<bool> {
        self.run(&["add", "-A"]).await?;

        let diff = self.run(&["diff", "--cached", "--name-only"]).await?;
        if String::from_utf8_lossy(&diff.stdout).trim().is_empty() {
            return Ok(false);
        }

        let output = self.run(&["commit", "-m", message]).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        info!(message, "committed changes");
        Ok(true)
    }

    /// `git diff --name-only` against the working tree; empty means no
    /// uncommitted changes (used by the `document` stage's skip check).
    pub async fn diff_is_empty(&self) -> GitResult<bool> {
        let output = self.run(&["diff", "--name-only"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// `git diff --name-only --diff-filter=U`: files with unresolved
    /// textual conflict markers against the current merge/rebase.
    pub async fn check_merge_conflicts(&self) -> GitResult<Vec<String>> {
        let output = self
            .run(&["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|l| l.to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    pub async fn push(&self, branch_name: &str) -> GitResult<()> {
        let output = self.run(&["push", "-u", "origin", branch_name]).await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    /// Merges `branch_name` into `main` using `strategy`. Returns the list
    /// of conflicting files (empty on success) without raising, so the
    /// caller can turn a non-empty result into `ConflictUnresolved`.
    pub async fn merge_into_main(
        &self,
        branch_name: &str,
        strategy: MergeStrategy,
    ) -> GitResult<Vec<String>> {
        self.run(&["checkout", "main"]).await?;

        let output = match strategy {
            MergeStrategy::Squash => {
                self.run(&["merge", "--squash", branch_name]).await?
            }
            MergeStrategy::Merge => self.run(&["merge", "--no-ff", branch_name]).await?,
            MergeStrategy::Rebase => self.run(&["rebase", branch_name]).await?,
        };

        if output.status.success() {
            return Ok(Vec::new());
        }

        self.check_merge_conflicts().await
    }

    /// `gh pr create --title <title> --body <body> --head <branch>`.
    /// Returns the PR URL printed to stdout.
    pub async fn pr_create(&self, title: &str, body: &str, branch_name: &str) -> GitResult<String> {
        let output = Command::new("gh")
            .args([
                "pr", "create", "--title", title, "--body", body, "--head", branch_name,
            ])
            .current_dir(&self.worktree_path)
            .output()
            .await
            .map_err(GitError::IoError)?;

        if !output.status.success() {
            return Err(GitError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Removes the remote branch, mirroring the worktree's local cleanup.
    pub async fn delete_remote_branch(&self, branch_name: &str) -> GitResult<()> {
        let output = self
            .run(&["push", "origin", "--delete", branch_name])
            .await?;
        if !output.status.success() {
            return Err(GitError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }
        Ok(())
    }

    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn diff_is_empty_on_clean_tree() {
        let dir = tempfile::tempdir().unwrap();
        Command::new("git")
            .args(["init"])
            .current_dir(dir.path())
            .output()
            .await
            .unwrap();
        let adapter = GitAdapter::new(dir.path());
        assert!(adapter.diff_is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn check_merge_conflicts_empty_outside_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        Command::new("git")
            .args(["init"])
            .current_dir(dir.path())
            .output()
            .await
            .unwrap();
        let adapter = GitAdapter::new(dir.path());
        assert!(adapter.check_merge_conflicts().await.unwrap().is_empty());
    }
}
