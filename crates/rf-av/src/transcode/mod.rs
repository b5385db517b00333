//! Live transcoding: one engine process per request, relayed as it is produced.
//!
//! [`Transcoder::start`] spawns the engine and waits for its first output
//! before returning, so a caller can still answer with an error status when
//! the engine dies immediately (bad source, unreachable host). Once the first
//! chunk exists the returned [`TranscodeStream`] owns the process.
//! Cancelling [`Transcoder::shutdown_token`] kills every engine still running.

mod args;
mod job;
mod stderr;

pub use args::{
    build_args, command_line, scale_filter, EncoderSettings, FRAGMENTED_MP4_FLAGS, STDOUT_TARGET,
};
pub use job::{JobOptions, JobState, Relay, RunningGuard, TranscodeJob};

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::command::program_name;
use crate::tools::ToolRegistry;
use rf_core::config::TranscodeConfig;

/// Spawns engine processes under the configured limits.
#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
    slots: Option<Arc<Semaphore>>,
    max_concurrent: Option<usize>,
    max_duration: Option<Duration>,
    running: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl Transcoder {
    /// Unlimited transcoder running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            slots: None,
            max_concurrent: None,
            max_duration: None,
            running: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cap the number of engines running at once.
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.slots = Some(Arc::new(Semaphore::new(limit)));
        self.max_concurrent = Some(limit);
        self
    }

    /// Kill any engine that runs longer than `limit`.
    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    /// Kill every engine, and refuse new ones, once `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn from_config(tools: &ToolRegistry, config: &TranscodeConfig) -> Self {
        let mut transcoder = Self::new(tools.path_or_name("ffmpeg"));
        if let Some(limit) = config.max_concurrent {
            transcoder = transcoder.with_max_concurrent(limit);
        }
        if let Some(secs) = config.max_duration_secs {
            transcoder = transcoder.with_max_duration(Duration::from_secs(secs));
        }
        transcoder
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Token that stops every engine started by this transcoder.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Jobs started and not yet released, with or without a slot limit.
    pub fn active(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the engine with `args` and wait for its first output.
    ///
    /// # Errors
    ///
    /// - [`rf_core::Error::Busy`] when every slot is taken, or shutdown has
    ///   begun.
    /// - [`rf_core::Error::EngineSpawn`] when the process cannot start.
    /// - [`rf_core::Error::EngineRuntime`] when it exits unsuccessfully,
    ///   or hits the duration limit, before writing anything.
    pub async fn start(&self, args: Vec<String>) -> rf_core::Result<TranscodeStream> {
        if self.shutdown.is_cancelled() {
            return Err(rf_core::Error::Busy("server is shutting down".into()));
        }

        let permit = match &self.slots {
            Some(slots) => Some(slots.clone().try_acquire_owned().map_err(|_| {
                tracing::warn!(
                    limit = self.max_concurrent,
                    "Rejecting transcode: all slots in use"
                );
                rf_core::Error::Busy("all transcode slots are in use".into())
            })?),
            None => None,
        };

        tracing::debug!("{}", command_line(&self.program.to_string_lossy(), &args));

        let options = JobOptions {
            max_duration: self.max_duration,
            permit,
            running: Some(RunningGuard::new(self.running.clone())),
            shutdown: Some(self.shutdown.clone()),
        };
        let mut job = TranscodeJob::spawn(&self.program, &args, options)?;

        loop {
            match job.next_output().await {
                Relay::Chunk(chunk) if chunk.is_empty() => continue,
                Relay::Chunk(chunk) => return Ok(TranscodeStream::relay(job, Some(chunk))),
                Relay::Eof => {
                    job.finish().await?;
                    return Ok(TranscodeStream::relay(job, None));
                }
                Relay::TimedOut => {
                    return Err(rf_core::Error::engine_runtime(
                        program_name(&self.program),
                        "duration limit reached before any output",
                    ));
                }
                Relay::Cancelled => {
                    return Err(rf_core::Error::Busy("server is shutting down".into()));
                }
                Relay::ReadError(e) => {
                    return Err(rf_core::Error::engine_runtime(
                        program_name(&self.program),
                        format!("reading output failed: {e}"),
                    ));
                }
            }
        }
    }
}

/// Engine output as a byte stream.
///
/// Dropping the stream before it ends kills the engine. A failure after output
/// has begun surfaces as a final `Err` item so the transport can abort the
/// response instead of ending it cleanly.
pub struct TranscodeStream {
    job_id: Uuid,
    pid: Option<u32>,
    state: watch::Receiver<JobState>,
    inner: Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>,
}

impl TranscodeStream {
    /// `first` is `None` when the engine already exited cleanly without output.
    fn relay(mut job: TranscodeJob, first: Option<Bytes>) -> Self {
        let (job_id, pid, state) = (job.id(), job.pid(), job.subscribe());

        let inner = async_stream::stream! {
            let Some(first) = first else {
                return;
            };
            yield Ok(first);
            loop {
                match job.next_output().await {
                    Relay::Chunk(chunk) => yield Ok(chunk),
                    Relay::Eof => {
                        if let Err(e) = job.finish().await {
                            yield Err(io::Error::other(e.to_string()));
                        }
                        break;
                    }
                    Relay::TimedOut => {
                        yield Err(io::Error::new(io::ErrorKind::TimedOut, "duration limit reached"));
                        break;
                    }
                    Relay::Cancelled => {
                        yield Err(io::Error::new(io::ErrorKind::Interrupted, "server shutting down"));
                        break;
                    }
                    Relay::ReadError(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Self {
            job_id,
            pid,
            state,
            inner: Box::pin(inner),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Engine process id at the time output started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }
}

impl Stream for TranscodeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for TranscodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeStream")
            .field("job_id", &self.job_id)
            .field("pid", &self.pid)
            .finish()
    }
}
