//! Containerized execution of one target's test command.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use crate::models::TIMEOUT_EXIT_CODE;

/// Everything the adapter needs to run one target.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Full image reference, already scoped to the architecture.
    pub image: String,
    pub repo: String,
    /// Commit to check out; the clone's default head when empty.
    pub commit: String,
    pub test_command: String,
    /// Merged job + target environment, passed as `-e` options.
    pub env: HashMap<String, String>,
    pub deadline: Duration,
}

/// Why an invocation did not produce a clean exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The process ran and exited non-zero. A normal result for failing
    /// tests, not a fault.
    NonZeroExit(i32),
    /// The runtime binary could not be spawned or waited on.
    Spawn(String),
}

impl RunError {
    pub fn message(&self) -> String {
        match self {
            RunError::NonZeroExit(code) => format!("exit status {}", code),
            RunError::Spawn(msg) => msg.clone(),
        }
    }
}

/// Result of one containerized invocation.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Process exit code; [`TIMEOUT_EXIT_CODE`] when the deadline expired
    /// before one was available.
    pub exit_code: i32,
    /// Combined captured output with section markers.
    pub log: String,
    pub timed_out: bool,
    pub error: Option<RunError>,
}

/// Seam between the dispatcher and the container runtime, so tests can
/// substitute a scripted executor.
#[async_trait]
pub trait TargetExecutor: Send + Sync {
    async fn run(&self, req: &ExecutionRequest) -> RunOutcome;
}

/// Runs targets through the Docker CLI.
pub struct DockerExecutor {
    docker_bin: String,
}

impl DockerExecutor {
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }
}

#[async_trait]
impl TargetExecutor for DockerExecutor {
    async fn run(&self, req: &ExecutionRequest) -> RunOutcome {
        let script = build_script(req);

        let mut cmd = Command::new(&self.docker_bin);
        cmd.arg("run").arg("--rm");
        for (key, value) in &req.env {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        cmd.arg(&req.image).arg("sh").arg("-c").arg(&script);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RunOutcome {
                    exit_code: -1,
                    log: combined_log(b"", b""),
                    timed_out: false,
                    error: Some(RunError::Spawn(e.to_string())),
                };
            }
        };

        // Drain both pipes while the child runs so the captured log survives
        // a deadline kill.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        match tokio::time::timeout(req.deadline, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                let exit_code = status.code().unwrap_or(-1);
                let error = if status.success() {
                    None
                } else {
                    Some(RunError::NonZeroExit(exit_code))
                };
                RunOutcome {
                    exit_code,
                    log: combined_log(&stdout, &stderr),
                    timed_out: false,
                    error,
                }
            }
            Ok(Err(e)) => {
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                RunOutcome {
                    exit_code: -1,
                    log: combined_log(&stdout, &stderr),
                    timed_out: false,
                    error: Some(RunError::Spawn(e.to_string())),
                }
            }
            Err(_) => {
                kill(&mut child).await;
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                RunOutcome {
                    exit_code: TIMEOUT_EXIT_CODE,
                    log: combined_log(&stdout, &stderr),
                    timed_out: true,
                    error: None,
                }
            }
        }
    }
}

/// Read a pipe to the end on a separate task. The readers finish once the
/// child exits or is killed and the pipe closes.
fn drain<R>(pipe: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "failed to kill timed-out container process");
    }
}

/// Shell script executed inside the container: fetch the commit, then run
/// the test command inside the repository working directory.
fn build_script(req: &ExecutionRequest) -> String {
    if req.commit.is_empty() {
        format!("git clone {} app && cd app && {}", req.repo, req.test_command)
    } else {
        format!(
            "git clone {} app && cd app && git checkout {} && {}",
            req.repo, req.commit, req.test_command
        )
    }
}

fn combined_log(stdout: &[u8], stderr: &[u8]) -> String {
    format!(
        "STDOUT:\n{}\nSTDERR:\n{}",
        String::from_utf8_lossy(stdout),
        String::from_utf8_lossy(stderr)
    )
}
