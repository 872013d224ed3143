//! Sandboxed snippet execution
//!
//! Each snippet runs in a fresh interpreter process, in its own process
//! group, with stdin closed and a hard wall-clock timeout. Output streams are
//! captured separately and rendered by [`output::format_output`]. A chart is
//! detected by the existence of [`CHART_FILENAME`] in the working directory
//! after the process exits.
//!
//! Runs that share a working directory are serialized: the chart file is
//! deleted before the run, checked after it and moved to its destination,
//! all under one per-directory lock.

mod output;
mod script;

#[cfg(test)]
mod proptests;

pub use output::{format_output, NO_OUTPUT, STDERR_MARKER};
pub use script::{compose_script, PANDAS_BINDING, PLOT_BINDING};

use crate::dataset::DatasetContext;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Wall-clock budget for one snippet
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Snippets save charts under this name to have them detected
pub const CHART_FILENAME: &str = "output.png";

const STAGING_DIR: &str = ".staging";

/// Per-working-directory run locks, shared by every executor in the process
static WORKSPACE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
    LazyLock::new(Mutex::default);

/// Exclusive use of one working directory. The lock entry is pruned when the
/// last holder or waiter lets go.
struct WorkspaceLease {
    dir: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl WorkspaceLease {
    async fn acquire(dir: &Path) -> Self {
        let lock = {
            let mut locks = WORKSPACE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(dir.to_path_buf()).or_default())
        };
        Self {
            dir: dir.to_path_buf(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        let mut locks = WORKSPACE_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
        drop(self.guard.take());
        if locks.get(&self.dir).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.dir);
        }
    }
}

/// One snippet to run against a dataset
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub code: String,
    pub dataset: DatasetContext,
    /// Where a detected chart is moved before the directory is released.
    /// `None` leaves it at [`CHART_FILENAME`].
    pub chart_destination: Option<PathBuf>,
}

/// Why a run did not complete normally.
///
/// Faults raised by the snippet itself are not failures; they arrive as
/// stderr text in [`ExecutionResult::output_text`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("{detail}")]
    Error { detail: String },
    #[error("execution cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub output_text: String,
    pub artifact_path: Option<PathBuf>,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionResult {
    fn completed(output_text: String, artifact_path: Option<PathBuf>) -> Self {
        Self {
            output_text,
            artifact_path,
            failure: None,
        }
    }

    fn failed(failure: ExecutionFailure) -> Self {
        Self {
            output_text: format!("[error]: {failure}"),
            artifact_path: None,
            failure: Some(failure),
        }
    }

    fn error(detail: impl Into<String>) -> Self {
        Self::failed(ExecutionFailure::Error {
            detail: detail.into(),
        })
    }
}

/// Removes the staged script when the run is over, whatever the outcome
struct StagedScript {
    path: PathBuf,
}

impl StagedScript {
    async fn write(dir: &Path, script: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("snippet-{}.py", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, script).await?;
        Ok(Self { path })
    }
}

impl Drop for StagedScript {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove staged script");
        }
    }
}

enum Outcome {
    Exited(io::Result<(ExitStatus, Vec<u8>, Vec<u8>)>),
    TimedOut,
    Cancelled,
}

/// Runs snippets in child interpreter processes rooted at one working directory
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    working_dir: PathBuf,
    interpreter: PathBuf,
    timeout: Duration,
}

impl SandboxExecutor {
    /// Create an executor, creating `working_dir` if needed
    pub fn new(working_dir: impl AsRef<Path>, interpreter: impl Into<PathBuf>) -> io::Result<Self> {
        std::fs::create_dir_all(working_dir.as_ref())?;
        let working_dir = std::fs::canonicalize(working_dir.as_ref())?;
        Ok(Self {
            working_dir,
            interpreter: interpreter.into(),
            timeout: EXECUTION_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Where a snippet's chart lands
    pub fn chart_path(&self) -> PathBuf {
        self.working_dir.join(CHART_FILENAME)
    }

    /// Run `request.code` after the dataset preamble.
    ///
    /// Never returns an error: launch failures, timeouts and cancellation are
    /// reported through [`ExecutionResult::failure`]. A detected chart is
    /// moved to `request.chart_destination` before another run can start.
    pub async fn run(&self, request: &ExecutionRequest, cancel: &CancellationToken) -> ExecutionResult {
        let script = compose_script(&request.dataset, &request.code);
        self.execute_script(&script, request.chart_destination.as_deref(), cancel)
            .await
    }

    async fn execute_script(
        &self,
        script: &str,
        chart_destination: Option<&Path>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let _lease = WorkspaceLease::acquire(&self.working_dir).await;

        let chart = self.chart_path();
        if let Err(e) = remove_if_exists(&chart).await {
            return ExecutionResult::error(format!("could not clear previous chart: {e}"));
        }

        let staged = match StagedScript::write(&self.working_dir.join(STAGING_DIR), script).await {
            Ok(s) => s,
            Err(e) => return ExecutionResult::error(format!("could not stage script: {e}")),
        };

        let start = Instant::now();
        let mut result = self.spawn_and_wait(&staged.path, &chart, cancel).await;
        if let (Some(found), Some(dest)) = (result.artifact_path.as_deref(), chart_destination) {
            match collect_chart(found, dest).await {
                Ok(()) => result.artifact_path = Some(dest.to_path_buf()),
                Err(e) => {
                    tracing::warn!(error = %e, chart = %found.display(), "Failed to collect chart");
                    if let Err(e) = remove_if_exists(found).await {
                        tracing::debug!(error = %e, "Failed to remove uncollected chart");
                    }
                    result.output_text.push_str(&format!("\n[error]: could not collect chart: {e}"));
                    result.artifact_path = None;
                }
            }
        }
        tracing::info!(
            working_dir = %self.working_dir.display(),
            duration_ms = %start.elapsed().as_millis(),
            failure = ?result.failure,
            chart = result.artifact_path.is_some(),
            "Snippet finished"
        );
        result
    }

    async fn spawn_and_wait(
        &self,
        script_path: &Path,
        chart: &Path,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(script_path)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // New process group so a kill reaches anything the snippet spawned
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ExecutionResult::error(format!(
                    "failed to launch {}: {e}",
                    self.interpreter.display()
                ))
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = tokio::select! {
            biased;

            () = cancel.cancelled() => Outcome::Cancelled,

            () = tokio::time::sleep(self.timeout) => Outcome::TimedOut,

            result = async {
                let (status, out, err) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
                Ok::<_, io::Error>((status?, out?, err?))
            } => Outcome::Exited(result),
        };

        match outcome {
            Outcome::Exited(Ok((status, stdout, stderr))) => {
                let stdout = String::from_utf8_lossy(&stdout);
                let stderr = String::from_utf8_lossy(&stderr);
                tracing::debug!(exit_code = ?status.code(), "Interpreter exited");

                let artifact = tokio::fs::try_exists(chart)
                    .await
                    .unwrap_or(false)
                    .then(|| chart.to_path_buf());
                ExecutionResult::completed(format_output(&stdout, &stderr), artifact)
            }
            Outcome::Exited(Err(e)) => {
                kill_process_group(pid);
                ExecutionResult::error(format!("failed while running interpreter: {e}"))
            }
            interrupted => {
                kill_process_group(pid);
                let _ = child.start_kill();
                if let Err(e) = child.wait().await {
                    tracing::warn!(error = %e, "Failed to reap killed interpreter");
                }
                // A killed run never hands over a chart
                if let Err(e) = remove_if_exists(chart).await {
                    tracing::warn!(error = %e, "Failed to remove chart from killed run");
                }
                match interrupted {
                    Outcome::Cancelled => ExecutionResult::failed(ExecutionFailure::Cancelled),
                    _ => ExecutionResult::failed(ExecutionFailure::Timeout(self.timeout)),
                }
            }
        }
    }
}

async fn drain(pipe: Option<impl AsyncRead + Unpin>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Move a chart out of the fixed filename so the next run cannot clobber it
async fn collect_chart(chart: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(chart, dest).await
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Kill a process group immediately with SIGKILL.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    tracing::debug!(pgid = pid, "Sending SIGKILL to process group");
    let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}
