use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use codeshare_core::ExecutionResult;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::capture::{self, Captured};
use crate::error::SandboxError;
use crate::process;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_CONCURRENT: usize = 8;
const MAX_OUTPUT_BYTES: usize = 1_000_000; // 1MB per stream

/// How long to wait for the output pipes to close once the child has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Host variables passed through to the child. Everything else is cleared.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "LANG", "LC_ALL", "SYSTEMROOT"];

/// Sandbox configuration.
#[derive(Clone, Debug)]
pub struct SandboxConfig {
    /// Interpreter binary, resolved through PATH when not absolute.
    pub interpreter: PathBuf,
    /// Hard wall-clock limit per execution.
    pub timeout: Duration,
    /// Maximum number of children running at once.
    pub max_concurrent: usize,
    /// Cap applied separately to stdout and stderr.
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            timeout: DEFAULT_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_output_bytes: MAX_OUTPUT_BYTES,
        }
    }
}

/// Runs untrusted code in a fresh child process per call.
///
/// The code is handed to the interpreter as a single argv entry after `-c`; no shell is
/// involved. Every child is reaped before `execute` returns, whatever the outcome.
pub struct SandboxExecutor {
    config: SandboxConfig,
    permits: Arc<Semaphore>,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, permits }
    }

    /// Number of executions that could start right now without queueing.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `code` and classify the outcome. Never returns an error; sandbox faults become
    /// `ExecutionResult::InternalError`.
    #[instrument(skip(self, code), fields(code_len = code.len()))]
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        if self.available_permits() == 0 {
            tracing::debug!("all execution slots busy, queueing");
        }
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return internal_error(SandboxError::Closed),
        };

        let start = Instant::now();
        let result = match self.run(code).await {
            Ok(result) => result,
            Err(e) => internal_error(e),
        };

        tracing::debug!(
            status = ?result.status(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "execution finished"
        );
        result
    }

    async fn run(&self, code: &str) -> Result<ExecutionResult, SandboxError> {
        // Dropped (and deleted) after the child has been reaped.
        let workdir = tempfile::Builder::new()
            .prefix("codeshare-exec-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg("-c")
            .arg(code)
            .current_dir(workdir.path())
            .env_clear()
            .envs(
                PASSTHROUGH_ENV
                    .iter()
                    .filter_map(|key| std::env::var_os(key).map(|val| (*key, val))),
            )
            .env("HOME", workdir.path())
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            interpreter: self.config.interpreter.clone(),
            source,
        })?;
        let pid = child.id();

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            (None, _) => {
                process::terminate(&mut child, pid).await;
                return Err(SandboxError::MissingPipe("stdout"));
            }
            (_, None) => {
                process::terminate(&mut child, pid).await;
                return Err(SandboxError::MissingPipe("stderr"));
            }
        };

        let limit = self.config.max_output_bytes;
        let stdout_task = tokio::spawn(capture::read_capped(stdout, limit));
        let stderr_task = tokio::spawn(capture::read_capped(stderr, limit));

        let status = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                process::terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(SandboxError::Wait(e));
            }
            Err(_) => {
                process::terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                tracing::warn!(
                    pid,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "execution timed out, child killed"
                );
                return Ok(ExecutionResult::TimedOut);
            }
        };

        // The interpreter has exited; anything it left behind in its group goes too.
        process::kill_group(pid);

        let stdout = join_capture(stdout_task).await?;
        let stderr = join_capture(stderr_task).await?;

        Ok(classify(status, stdout, stderr))
    }
}

fn classify(status: ExitStatus, stdout: Captured, stderr: Captured) -> ExecutionResult {
    if status.success() {
        ExecutionResult::Success {
            stdout: stdout.into_text(),
        }
    } else {
        ExecutionResult::Failure {
            stderr: stderr.into_text(),
            exit_code: status.code(),
        }
    }
}

async fn join_capture(
    task: JoinHandle<std::io::Result<Captured>>,
) -> Result<Captured, SandboxError> {
    let abort = task.abort_handle();
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, task).await {
        Ok(Ok(result)) => result.map_err(SandboxError::Capture),
        Ok(Err(join_err)) => Err(SandboxError::Capture(std::io::Error::other(
            join_err.to_string(),
        ))),
        Err(_) => {
            // A descendant escaped the process group and still holds the pipe open.
            abort.abort();
            tracing::warn!("output pipe still open after child exit, discarding");
            Ok(Captured::default())
        }
    }
}

fn internal_error(err: SandboxError) -> ExecutionResult {
    tracing::error!(error = %err, "sandbox internal error");
    ExecutionResult::InternalError {
        message: err.to_string(),
    }
}
