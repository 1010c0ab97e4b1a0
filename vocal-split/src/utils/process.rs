//! Running external tools with a hard deadline and cancellation.
//!
//! Output lines are captured concurrently so a chatty tool never blocks on a
//! full pipe, and the tail of stderr is kept for error reporting.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Number of trailing stderr lines kept for failure messages.
const STDERR_TAIL_LINES: usize = 8;

/// Failure while running an external tool.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("`{tool}` is not installed or not on PATH")]
    Missing { tool: String },

    #[error("failed to start `{tool}`: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{tool}` timed out after {}s", .timeout.as_secs())]
    Timeout { tool: String, timeout: Duration },

    #[error("`{tool}` exited with {}: {stderr}", describe_exit(.code))]
    ExitStatus {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{tool}` was cancelled")]
    Cancelled { tool: String },
}

/// `code N`, or `signal` when the process was killed.
pub(crate) fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "signal".to_string(),
    }
}

impl ToolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Captured result of a successful tool run.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub duration: Duration,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Display name of a tool program (file name without directories).
pub fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
        .to_string()
}

/// Spawn `command`, wait for it with `timeout` as a wall-clock bound, and kill
/// it on timeout or cancellation.
pub async fn run_tool(
    mut command: Command,
    tool: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError> {
    let start = Instant::now();

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ToolError::Missing {
                tool: tool.to_string(),
            }
        } else {
            ToolError::Spawn {
                tool: tool.to_string(),
                source: e,
            }
        }
    })?;

    let stdout_task = child.stdout.take().map(|stdout| {
        let tool = tool.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(tool = %tool, "stdout: {}", line);
                collected.push(line);
            }
            collected
        })
    });

    let stderr_task = child.stderr.take().map(|stderr| {
        let tool = tool.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                // Progress bars and info go to stderr for most of these tools.
                if line.to_lowercase().contains("error") {
                    warn!(tool = %tool, "stderr: {}", line);
                } else {
                    debug!(tool = %tool, "stderr: {}", line);
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>()
        })
    });

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        _ = cancel.cancelled() => Outcome::Cancelled,
    };

    if !matches!(outcome, Outcome::Exited(_)) {
        let _ = child.kill().await;
        // Grandchildren may still hold the pipes open.
        if let Some(handle) = &stdout_task {
            handle.abort();
        }
        if let Some(handle) = &stderr_task {
            handle.abort();
        }
    }

    let status = match outcome {
        Outcome::Exited(Ok(status)) => status,
        Outcome::Exited(Err(e)) => {
            return Err(ToolError::Spawn {
                tool: tool.to_string(),
                source: e,
            });
        }
        Outcome::TimedOut => {
            warn!(tool = %tool, "Killed after {}s timeout", timeout.as_secs());
            return Err(ToolError::Timeout {
                tool: tool.to_string(),
                timeout,
            });
        }
        Outcome::Cancelled => {
            return Err(ToolError::Cancelled {
                tool: tool.to_string(),
            });
        }
    };

    let stdout = match stdout_task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr = match stderr_task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };

    if !status.success() {
        return Err(ToolError::ExitStatus {
            tool: tool.to_string(),
            code: status.code(),
            stderr: stderr.join(" | "),
        });
    }

    Ok(ToolOutput {
        status,
        duration: start.elapsed(),
        stdout,
        stderr,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = process_utils::tokio_command("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_lines() {
        let token = CancellationToken::new();
        let out = run_tool(sh("echo one; echo two"), "sh", Duration::from_secs(5), &token)
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn nonzero_exit_carries_stderr_tail() {
        let token = CancellationToken::new();
        let err = run_tool(
            sh("echo boom >&2; exit 3"),
            "sh",
            Duration::from_secs(5),
            &token,
        )
        .await
        .unwrap_err();
        match err {
            ToolError::ExitStatus { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_distinct_from_exit_failure() {
        let token = CancellationToken::new();
        let err = run_tool(sh("exec sleep 5"), "sh", Duration::from_millis(100), &token)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_tool() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = run_tool(sh("exec sleep 5"), "sh", Duration::from_secs(10), &token)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_program_is_reported_as_missing() {
        let token = CancellationToken::new();
        let cmd = process_utils::tokio_command("definitely-not-a-real-tool-7f3a9c");
        let err = run_tool(cmd, "fake", Duration::from_secs(1), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Missing { .. }));
    }

    #[test]
    fn tool_name_strips_directories() {
        assert_eq!(tool_name("/usr/local/bin/demucs"), "demucs");
        assert_eq!(tool_name("ffmpeg"), "ffmpeg");
    }
}
