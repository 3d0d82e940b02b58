//! Spawns the external agent CLI as a subprocess, streams its stdout/stderr,
//! enforces a hard timeout, and scrubs auth environment variables before the
//! child ever starts.

use crate::errors::{ProcessError, ProcessResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// The environment variable scrubbed from every child process so the agent
/// falls back to its own credentials rather than inheriting ours.
pub const SCRUBBED_AUTH_ENV_VAR: &str = "ANTHROPIC_API_KEY";

pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Which stream a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Stdout,
    Stderr,
}

/// Invoked once per line of child output, before it's appended to the
/// captured output string. A single async interface covers both
/// synchronous and asynchronous callers: the blanket impl below lets a
/// plain closure satisfy the trait without an extra `async fn` wrapper.
#[async_trait]
pub trait LineCallback: Send + Sync {
    async fn on_line(&self, source: LineSource, line: &str);
}

#[async_trait]
impl<F> LineCallback for F
where
    F: Fn(LineSource, &str) + Send + Sync,
{
    async fn on_line(&self, source: LineSource, line: &str) {
        (self)(source, line)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessRunnerConfig {
    pub timeout: Duration,
    pub extra_env: HashMap<String, String>,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            extra_env: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub command: String,
    pub exit_code: i32,
    pub output: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

pub struct ProcessRunner {
    config: ProcessRunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }

    /// Spawns `program args...` with `cwd` as its working directory. The
    /// child's environment never carries [`SCRUBBED_AUTH_ENV_VAR`]. stdout
    /// and stderr are read concurrently; each line is handed to `callback`
    /// (if present), tagged by source, before being appended to the
    /// captured output. A timed-out child is killed and reports exit code
    /// `-1` with a distinct timeout error.
    pub async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        callback: Option<Arc<dyn LineCallback>>,
    ) -> ProcessResult<ProcessOutput> {
        let started_at = Utc::now();
        let command_str = format!("{program} {}", args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .env_remove(SCRUBBED_AUTH_ENV_VAR)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in &self.config.extra_env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_cb = callback.clone();
        let stdout_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(cb) = &stdout_cb {
                    cb.on_line(LineSource::Stdout, &line).await;
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let stderr_cb = callback.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(cb) = &stderr_cb {
                    cb.on_line(LineSource::Stderr, &line).await;
                }
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let wait_result = tokio::time::timeout(self.config.timeout, child.wait()).await;

        let (stdout_text, stderr_text) = tokio::join!(stdout_task, stderr_task);
        let stdout_text = stdout_text.unwrap_or_default();
        let stderr_text = stderr_text.unwrap_or_default();

        let completed_at = Utc::now();

        match wait_result {
            Ok(Ok(status)) => {
                let exit_code = status.code().unwrap_or(-1);
                debug!(command = %command_str, exit_code, "process completed");
                Ok(ProcessOutput {
                    success: status.success(),
                    command: command_str,
                    exit_code,
                    output: stdout_text,
                    error: if stderr_text.is_empty() {
                        None
                    } else {
                        Some(stderr_text)
                    },
                    started_at,
                    completed_at,
                })
            }
            Ok(Err(e)) => Err(ProcessError::IoError(e)),
            Err(_) => {
                warn!(command = %command_str, timeout = ?self.config.timeout, "process timed out, killing");
                let _ = child.kill().await;
                Err(ProcessError::Timeout(self.config.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn scrubs_auth_env_var_from_child() {
        std::env::set_var(SCRUBBED_AUTH_ENV_VAR, "sk-test-secret");
        let runner = ProcessRunner::new(ProcessRunnerConfig::default());
        let out = runner
            .run(
                "sh",
                &["-c".to_string(), format!("echo ${SCRUBBED_AUTH_ENV_VAR}")],
                Path::new("."),
                None,
            )
            .await
            .unwrap();
        std::env::remove_var(SCRUBBED_AUTH_ENV_VAR);
        assert!(out.success);
        assert_eq!(out.output.trim(), "");
    }

    #[tokio::test]
    async fn streams_lines_to_callback() {
        let lines: Arc<Mutex<Vec<(LineSource, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        let callback: Arc<dyn LineCallback> = Arc::new(move |source: LineSource, line: &str| {
            captured.lock().unwrap().push((source, line.to_string()));
        });

        let runner = ProcessRunner::new(ProcessRunnerConfig::default());
        let out = runner
            .run(
                "sh",
                &["-c".to_string(), "echo one; echo two 1>&2".to_string()],
                Path::new("."),
                Some(callback),
            )
            .await
            .unwrap();

        assert!(out.success);
        let captured = lines.lock().unwrap();
        assert!(captured.iter().any(|(s, l)| *s == LineSource::Stdout && l == "one"));
        assert!(captured.iter().any(|(s, l)| *s == LineSource::Stderr && l == "two"));
    }

    #[tokio::test]
    async fn timeout_kills_child_and_reports_timeout_error() {
        let runner = ProcessRunner::new(ProcessRunnerConfig {
            timeout: Duration::from_millis(50),
            extra_env: HashMap::new(),
        });
        let err = runner
            .run("sh", &["-c".to_string(), "sleep 5".to_string()], Path::new("."), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_an_error() {
        let runner = ProcessRunner::new(ProcessRunnerConfig::default());
        let out = runner
            .run("sh", &["-c".to_string(), "exit 3".to_string()], Path::new("."), None)
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, 3);
    }
}
