//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which lays out a temporary workspace, installs
//! fake `ffmpeg`/`ffplay` shell scripts, and builds a [`ToolDispatcher`] over
//! them.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use vidrelay::{ToolDispatcher, ToolRequest};
use vr_av::ToolRegistry;
use vr_core::config::Config;
use vr_core::{ProgressEvent, ProgressSender};

/// Writes its arguments one per line to `args.txt` next to the script and
/// creates the output file (the last argument).
pub const RECORD_ARGS: &str = r#"printf '%s\n' "$@" > "$(dirname "$0")/args.txt"
for last in "$@"; do :; done
: > "$last"
"#;

/// Emits 95 statistics lines on stderr, then succeeds.
pub const EMIT_PROGRESS: &str = r#"i=0
while [ $i -lt 95 ]; do
  echo "frame= $i fps=25 q=-1.0 size=N/A time=00:00:0$((i % 10)).00" >&2
  i=$((i + 1))
done
"#;

/// Fails the way ffmpeg does on a corrupt input.
pub const FAIL_WITH_DIAGNOSTICS: &str = r#"echo "frame= 1 fps=0" >&2
echo "clip.mp4: Invalid data found when processing input" >&2
exit 1
"#;

/// Runs far longer than any test waits.
pub const HANG: &str = "exec sleep 30\n";

/// Like [`HANG`], but writes its pid to `pid` next to the script first.
pub const HANG_RECORDING_PID: &str = r#"echo $$ > "$(dirname "$0")/pid"
exec sleep 30
"#;

/// A temporary workspace with fake media tools.
pub struct TestHarness {
    pub dir: TempDir,
    pub config: Config,
    pub tools: ToolRegistry,
}

impl TestHarness {
    /// Workspace whose `ffmpeg` and `ffplay` both run `body`.
    pub fn new(body: &str) -> Self {
        Self::with_timeout(body, Duration::from_secs(30))
    }

    pub fn with_timeout(body: &str, timeout: Duration) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");

        let mut config = Config::default();
        config.workspace.root = dir.path().join("workspace");
        config.limits.process_timeout = timeout;
        config
            .ensure_directories()
            .expect("failed to create workspace layout");

        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin).expect("failed to create bin dir");
        let tools = ToolRegistry::default()
            .with_tool("ffmpeg", fake_tool(&bin, "ffmpeg", body))
            .with_tool("ffplay", fake_tool(&bin, "ffplay", body));

        Self { dir, config, tools }
    }

    pub fn dispatcher(&self) -> ToolDispatcher {
        ToolDispatcher::new(Arc::new(self.config.clone()), Arc::new(self.tools.clone()))
    }

    pub fn input_dir(&self) -> PathBuf {
        self.config.workspace.input_dir()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.workspace.output_dir()
    }

    /// Create a small file in the input directory.
    pub fn add_input(&self, name: &str) -> PathBuf {
        let path = self.input_dir().join(name);
        fs::write(&path, b"not really a video").expect("failed to write input");
        path
    }

    /// Arguments recorded by [`RECORD_ARGS`], if the fake tool ran.
    pub fn recorded_args(&self) -> Option<Vec<String>> {
        let contents = fs::read_to_string(self.dir.path().join("bin/args.txt")).ok()?;
        Some(contents.lines().map(String::from).collect())
    }

    /// Pid recorded by [`HANG_RECORDING_PID`], if the fake tool ran.
    pub fn recorded_pid(&self) -> Option<u32> {
        let contents = fs::read_to_string(self.dir.path().join("bin/pid")).ok()?;
        contents.trim().parse().ok()
    }
}

/// Whether a process with `pid` still exists.
pub fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Write an executable `sh` script named `name` into `dir`.
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("failed to write fake tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("failed to make fake tool executable");
    path
}

pub fn request(name: &str, arguments: serde_json::Value) -> ToolRequest {
    ToolRequest::new(name, arguments)
}

/// A progress sender plus a way to collect everything it received.
pub fn progress_channel() -> (ProgressSender, tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) {
    ProgressSender::channel()
}

pub fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
