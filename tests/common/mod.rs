//! Shared test harness for integration tests.
//!
//! [`TestHarness`] starts the full router on a random port with fake engine
//! scripts standing in for ffmpeg and ffprobe. Scripts are plain `sh` and can
//! find their own directory as `$DIR`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use base64::Engine as _;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use rf_av::ToolRegistry;
use rf_core::config::Config;
use rf_server::context::AppContext;

/// A running server plus the temp directory holding its fake tools.
pub struct TestHarness {
    pub ctx: AppContext,
    pub addr: SocketAddr,
    server: JoinHandle<rf_core::Result<()>>,
    dir: TempDir,
}

impl TestHarness {
    /// Start a server whose ffmpeg runs `engine` as a shell script body.
    pub async fn with_engine(engine: &str) -> Self {
        Self::builder().engine(engine).start().await
    }

    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Directory containing the fake tools and anything they write.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// `/api/stream` URL for `source` with extra query parameters appended.
    pub fn stream_url(&self, source: &str, extra: &str) -> String {
        self.url(&format!("/api/stream?url={}{}", encode_param(source), extra))
    }

    pub fn metadata_url(&self, source: &str) -> String {
        self.url(&format!("/api/metadata?url={}", encode_param(source)))
    }

    /// Lines the fake engine wrote with [`RECORD_ARGS`].
    pub fn recorded_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir().join("args.txt"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Wait up to `within` for the server to finish shutting down cleanly.
    /// Shutdown is triggered by cancelling `ctx.shutdown`.
    pub async fn stopped(&mut self, within: Duration) -> bool {
        matches!(
            tokio::time::timeout(within, &mut self.server).await,
            Ok(Ok(Ok(())))
        )
    }

    /// Pid the fake engine wrote with [`RECORD_PID`].
    pub async fn recorded_pid(&self) -> u32 {
        let path = self.dir().join("pid.txt");
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(text) = std::fs::read_to_string(&path) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            assert!(Instant::now() < deadline, "engine never wrote its pid");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[derive(Default)]
pub struct HarnessBuilder {
    config: Config,
    engine: Option<String>,
    probe: Option<String>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn engine(mut self, script: &str) -> Self {
        self.engine = Some(script.to_string());
        self
    }

    pub fn probe(mut self, script: &str) -> Self {
        self.probe = Some(script.to_string());
        self
    }

    pub async fn start(self) -> TestHarness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = self.config;

        config.tools.ffmpeg_path = Some(match self.engine {
            Some(body) => write_script(dir.path(), "ffmpeg", &body),
            None => dir.path().join("missing-ffmpeg"),
        });
        config.tools.ffprobe_path = Some(match self.probe {
            Some(body) => write_script(dir.path(), "ffprobe", &body),
            None => dir.path().join("missing-ffprobe"),
        });

        // Discovery falls back to PATH for missing tools; pin them so tests
        // never pick up a real ffmpeg.
        let tools = pin_to_dir(ToolRegistry::discover(&config.tools), dir.path());

        let ctx = AppContext::new(config, tools);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(rf_server::serve(
            listener,
            ctx.clone(),
            std::future::pending(),
        ));

        TestHarness {
            ctx,
            addr,
            server,
            dir,
        }
    }
}

/// Replace any tool resolved outside `dir` with a path inside it that does
/// not exist.
fn pin_to_dir(tools: ToolRegistry, dir: &Path) -> ToolRegistry {
    let pin = |name: &'static str| {
        let path = tools.path_or_name(name);
        if path.starts_with(dir) {
            (name, path)
        } else {
            (name, dir.join(format!("missing-{name}")))
        }
    };
    ToolRegistry::with_paths([pin("ffmpeg"), pin("ffprobe")])
}

/// Script prelude: record argv, one per line, into `$DIR/args.txt`.
pub const RECORD_ARGS: &str = "printf '%s\\n' \"$@\" > \"$DIR/args.txt\"";

/// Script prelude: record the shell's pid into `$DIR/pid.txt`.
pub const RECORD_PID: &str = "echo $$ > \"$DIR/pid.txt\"";

/// Write an executable `sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!("#!/bin/sh\nDIR=\"$(dirname \"$0\")\"\n{body}\n");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Base64-encode a source URL and escape it for a query string.
pub fn encode_param(source: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .encode(source)
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}

/// True once `pid` has exited (gone or zombie).
pub fn process_exited(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
        Err(_) => true,
    }
}

/// Poll until `pid` exits or `within` elapses.
pub async fn wait_for_exit(pid: u32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if process_exited(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// Poll until `check` holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
