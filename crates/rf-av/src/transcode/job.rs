//! A single engine subprocess and its lifecycle.
//!
//! ```text
//! Spawning ──> Streaming ──> Completed
//!     │            ├───────> Failed
//!     └──> Failed  └───────> Killed
//! ```
//!
//! Terminal states are final. A job that is dropped before reaching one is
//! killed, which is how a client disconnect tears the engine down: the HTTP
//! transport drops the response body, the body owns the job.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::stderr::StderrDrain;
use crate::command::program_name;

/// How long to wait for the stderr drain after the process exits.
const STDERR_SETTLE: Duration = Duration::from_secs(1);

/// Lifecycle state of a [`TranscodeJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Spawning,
    Streaming,
    /// Exited with status 0.
    Completed,
    /// Failed to start, or exited unsuccessfully.
    Failed,
    /// Terminated by us: client went away, the duration limit fired, or the
    /// server is shutting down.
    Killed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawning => write!(f, "spawning"),
            Self::Streaming => write!(f, "streaming"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// Result of waiting for the next piece of engine output.
#[derive(Debug)]
pub enum Relay {
    /// Bytes read from stdout, in order.
    Chunk(Bytes),
    /// stdout closed; call [`TranscodeJob::finish`] for the exit status.
    Eof,
    /// The duration limit was reached and the engine has been killed.
    TimedOut,
    /// Shutdown was requested and the engine has been killed.
    Cancelled,
    /// Reading stdout failed; the engine has been killed.
    ReadError(io::Error),
}

/// Options fixed at spawn time.
#[derive(Debug, Default)]
pub struct JobOptions {
    /// Kill the engine after this long.
    pub max_duration: Option<Duration>,
    /// Admission permit, released when the job is dropped.
    pub permit: Option<OwnedSemaphorePermit>,
    /// Counts the job as running until it is dropped.
    pub running: Option<RunningGuard>,
    /// Kill the engine once this token is cancelled.
    pub shutdown: Option<CancellationToken>,
}

/// One unit of a shared running-jobs count, released on drop.
#[derive(Debug)]
pub struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What woke [`TranscodeJob::next_output`].
enum Wake {
    Output(Option<io::Result<Bytes>>),
    Deadline,
    Shutdown,
}

/// One running engine process, owned by exactly one request.
pub struct TranscodeJob {
    id: Uuid,
    tool: String,
    child: Option<Child>,
    stdout: ReaderStream<ChildStdout>,
    stderr: Option<StderrDrain>,
    state: JobState,
    state_tx: watch::Sender<JobState>,
    bytes_sent: u64,
    started: Instant,
    deadline: Option<tokio::time::Instant>,
    shutdown: Option<CancellationToken>,
    _permit: Option<OwnedSemaphorePermit>,
    _running: Option<RunningGuard>,
}

impl TranscodeJob {
    /// Spawn `program` with `args`: stdin closed, stdout and stderr piped.
    ///
    /// # Errors
    ///
    /// Returns [`rf_core::Error::EngineSpawn`] if the process cannot be
    /// started. Nothing is retried.
    pub fn spawn(program: &Path, args: &[String], options: JobOptions) -> rf_core::Result<Self> {
        let id = Uuid::new_v4();
        let tool = program_name(program);
        tracing::debug!(job = %id, state = %JobState::Spawning, "Starting {tool}");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            tracing::error!(job = %id, state = %JobState::Failed, "Failed to spawn {tool}: {e}");
            rf_core::Error::engine_spawn(&tool, e.to_string())
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            rf_core::Error::engine_spawn(&tool, "stdout was not captured")
        })?;
        let stderr = child
            .stderr
            .take()
            .map(|stderr| StderrDrain::spawn(stderr, id));

        let (state_tx, _) = watch::channel(JobState::Spawning);
        let mut job = Self {
            id,
            tool,
            child: Some(child),
            stdout: ReaderStream::new(stdout),
            stderr,
            state: JobState::Spawning,
            state_tx,
            bytes_sent: 0,
            started: Instant::now(),
            deadline: options
                .max_duration
                .map(|d| tokio::time::Instant::now() + d),
            shutdown: options.shutdown,
            _permit: options.permit,
            _running: options.running,
        };

        tracing::info!(job = %job.id, pid = ?job.pid(), "Spawned {}", job.tool);
        job.transition(JobState::Streaming);
        Ok(job)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// OS process id while the child is still owned by the job.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Bytes handed out by [`TranscodeJob::next_output`] so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Observe state changes from outside the owning task.
    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state_tx.subscribe()
    }

    /// Wait for the next stdout chunk, end of output, the deadline, or
    /// shutdown.
    pub async fn next_output(&mut self) -> Relay {
        use futures_core::Stream;
        use std::future::pending;
        use std::pin::Pin;

        let deadline = self.deadline;
        let shutdown = self.shutdown.clone();

        let read = std::future::poll_fn(|cx| Pin::new(&mut self.stdout).poll_next(cx));
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending().await,
            }
        };
        let cancelled = async move {
            match &shutdown {
                Some(token) => token.cancelled().await,
                None => pending().await,
            }
        };

        let wake = tokio::select! {
            next = read => Wake::Output(next),
            _ = expired => Wake::Deadline,
            _ = cancelled => Wake::Shutdown,
        };

        match wake {
            Wake::Output(Some(Ok(chunk))) => {
                self.bytes_sent += chunk.len() as u64;
                Relay::Chunk(chunk)
            }
            Wake::Output(None) => Relay::Eof,
            Wake::Output(Some(Err(e))) => {
                tracing::error!(job = %self.id, "Reading {} output failed: {e}", self.tool);
                self.kill("stdout read error");
                Relay::ReadError(e)
            }
            Wake::Deadline => {
                self.kill("duration limit reached");
                Relay::TimedOut
            }
            Wake::Shutdown => {
                self.kill("server shutting down");
                Relay::Cancelled
            }
        }
    }

    /// Reap the process after end of output and settle the final state.
    ///
    /// # Errors
    ///
    /// Returns [`rf_core::Error::EngineRuntime`] for a non-zero exit. The
    /// message carries the exit status and the stderr tail; it is meant for
    /// logs, not for clients.
    pub async fn finish(&mut self) -> rf_core::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Err(rf_core::Error::engine_runtime(
                &self.tool,
                format!("process already {}", self.state),
            ));
        };

        let status = child.wait().await;
        let tail = match self.stderr.take() {
            Some(drain) => drain.tail(STDERR_SETTLE).await,
            None => String::new(),
        };

        match status {
            Ok(status) if status.success() => {
                self.transition(JobState::Completed);
                Ok(())
            }
            Ok(status) => {
                let message = failure_message(status, &tail);
                tracing::error!(
                    job = %self.id,
                    bytes_sent = self.bytes_sent,
                    "{} failed: {message}",
                    self.tool
                );
                self.transition(JobState::Failed);
                Err(rf_core::Error::engine_runtime(&self.tool, message))
            }
            Err(e) => {
                tracing::error!(job = %self.id, "Waiting for {} failed: {e}", self.tool);
                self.transition(JobState::Failed);
                Err(rf_core::Error::engine_runtime(
                    &self.tool,
                    format!("wait failed: {e}"),
                ))
            }
        }
    }

    /// Kill the engine and move to [`JobState::Killed`]. No-op once terminal.
    ///
    /// The child is reaped on a background task so no zombie is left behind.
    pub fn kill(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::warn!(job = %self.id, "Failed to kill {}: {e}", self.tool);
            }
            let id = self.id;
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        match child.wait().await {
                            Ok(status) => tracing::debug!(job = %id, "Reaped engine: {status}"),
                            Err(e) => tracing::debug!(job = %id, "Reaping engine failed: {e}"),
                        }
                    });
                }
                // Outside a runtime kill_on_drop still delivers the signal.
                Err(_) => drop(child),
            }
        }

        tracing::info!(job = %self.id, bytes_sent = self.bytes_sent, "Killing {}: {reason}", self.tool);
        self.transition(JobState::Killed);
    }

    fn transition(&mut self, next: JobState) {
        if self.state.is_terminal() {
            tracing::warn!(job = %self.id, from = %self.state, to = %next, "Ignoring transition out of terminal state");
            return;
        }

        let elapsed = self.started.elapsed();
        if next.is_terminal() {
            tracing::info!(
                job = %self.id,
                from = %self.state,
                to = %next,
                bytes_sent = self.bytes_sent,
                elapsed_ms = elapsed.as_millis() as u64,
                "Transcode finished"
            );
        } else {
            tracing::debug!(job = %self.id, from = %self.state, to = %next, "Transcode state change");
        }

        self.state = next;
        self.state_tx.send_replace(next);
    }
}

impl Drop for TranscodeJob {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.kill("client disconnected");
        }
    }
}

impl fmt::Debug for TranscodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeJob")
            .field("id", &self.id)
            .field("tool", &self.tool)
            .field("state", &self.state)
            .field("bytes_sent", &self.bytes_sent)
            .finish()
    }
}

fn failure_message(status: ExitStatus, stderr_tail: &str) -> String {
    if stderr_tail.is_empty() {
        format!("exited with {status}")
    } else {
        format!("exited with {status}: {stderr_tail}")
    }
}
