//! Continuous stderr drain for a running engine.
//!
//! The pipe must never fill up: an engine blocked on a full stderr buffer
//! stops producing stdout as well. Every line is logged under the `ffmpeg`
//! target and the last few are kept for failure reports.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Lines retained for diagnostics.
const TAIL_LINES: usize = 20;

/// Handle to a background stderr reader.
pub(crate) struct StderrDrain {
    handle: JoinHandle<String>,
}

impl StderrDrain {
    /// Start draining `stderr` on its own task, inside the caller's span.
    pub(crate) fn spawn<R>(stderr: R, job_id: Uuid) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        tracing::warn!(target: "ffmpeg", job = %job_id, "{line}");
                        if tail.len() == TAIL_LINES {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                    Err(e) => {
                        tracing::debug!(job = %job_id, "stderr read error: {e}");
                        break;
                    }
                }
            }

            Vec::from(tail).join("\n")
        }
        .in_current_span());

        Self { handle }
    }

    /// Wait up to `wait` for the drain to finish and return the retained
    /// tail. Returns an empty string if the pipe is still open.
    pub(crate) async fn tail(self, wait: Duration) -> String {
        let mut handle = self.handle;
        match tokio::time::timeout(wait, &mut handle).await {
            Ok(Ok(tail)) => tail,
            Ok(Err(_join)) => String::new(),
            Err(_elapsed) => {
                handle.abort();
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_only_the_last_lines() {
        let input: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let drain = StderrDrain::spawn(std::io::Cursor::new(input.into_bytes()), Uuid::new_v4());
        let tail = drain.tail(Duration::from_secs(1)).await;
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), TAIL_LINES);
        assert_eq!(lines[0], "line 30");
        assert_eq!(lines[TAIL_LINES - 1], "line 49");
    }

    #[tokio::test]
    async fn tolerates_invalid_utf8() {
        let input = b"ok\n\xff\xfe broken\nafter\n".to_vec();
        let drain = StderrDrain::spawn(std::io::Cursor::new(input), Uuid::new_v4());
        let tail = drain.tail(Duration::from_secs(1)).await;
        assert!(tail.ends_with("after"), "tail was {tail:?}");
        assert_eq!(tail.lines().count(), 3);
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn lines_are_logged_inside_the_spawning_span() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let span = tracing::warn_span!("request", request_id = "req-42");
        let drain = {
            let _entered = span.enter();
            StderrDrain::spawn(
                std::io::Cursor::new(b"Connection refused\n".to_vec()),
                Uuid::new_v4(),
            )
        };
        drain.tail(Duration::from_secs(1)).await;

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("Connection refused"))
            .unwrap_or_else(|| panic!("no stderr line logged: {output:?}"));
        assert!(line.contains("req-42"), "span missing: {line}");
    }

    #[tokio::test]
    async fn open_pipe_times_out_empty() {
        let (_writer, reader) = tokio::io::duplex(64);
        let drain = StderrDrain::spawn(reader, Uuid::new_v4());
        let tail = drain.tail(Duration::from_millis(50)).await;
        assert!(tail.is_empty());
    }
}
