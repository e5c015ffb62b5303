//! Builder for executing external tool commands with progress, timeout and
//! cancellation support.
//!
//! Arguments are always handed to the OS as a vector; nothing here ever goes
//! through a shell.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use vr_core::{Error, ProgressSender, Result};

use crate::invocation::ProcessInvocation;

/// Default command timeout: 1 hour.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Longest diagnostic line kept; anything longer ends line reading and the
/// rest of stderr is discarded.
pub const MAX_DIAGNOSTIC_LINE: usize = 64 * 1024;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Last lines of standard error (lossy UTF-8).
    pub stderr: String,
}

/// How the supervised run ended.
enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use vr_av::ToolCommand;
/// use vr_core::ProgressSender;
/// use tokio_util::sync::CancellationToken;
/// use std::path::PathBuf;
///
/// # async fn example() -> vr_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .args(["-i", "/srv/input/clip.mp4", "-c", "copy", "/srv/output/copy.mp4"])
///     .run(&ProgressSender::noop(), &CancellationToken::new())
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append a path argument.
    pub fn path_arg(&mut self, p: &Path) -> &mut Self {
        self.arg(p.to_string_lossy())
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the program name.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Short tool name for messages (file name of the program).
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Full argument vector including the program.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Execute the command without progress reporting or cancellation.
    pub async fn execute(&self) -> Result<ToolOutput> {
        self.run(&ProgressSender::noop(), &CancellationToken::new())
            .await
    }

    /// Run the command to completion, streaming progress.
    ///
    /// Standard error is read line by line (`\n` or `\r` terminated); every
    /// 30th statistics line yields a progress event. The final event always
    /// carries 100%, error-flagged unless the process exited successfully.
    ///
    /// # Errors
    ///
    /// - [`Error::Spawn`] if the process cannot be started.
    /// - [`Error::Process`] if it exits unsuccessfully (carries the stderr tail).
    /// - [`Error::Timeout`] if it outlives the time budget; it is killed first.
    /// - [`Error::Cancelled`] if `cancel` fires; it is killed first.
    pub async fn run(
        &self,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let tool = self.tool_name();
        let mut invocation = ProcessInvocation::new(self.argv());

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                invocation.fail();
                tracing::error!("Failed to launch {tool}: {e}");
                progress.fail(format!("Failed to launch {tool}: {e}"));
                return Err(Error::spawn(tool, e.to_string()));
            }
        };
        invocation.start();
        tracing::info!("Starting {tool}: {}", invocation.command_line());
        progress.log(&format!("Starting {tool}: {}", invocation.command_line()));

        let (Some(stderr), Some(mut stdout)) = (child.stderr.take(), child.stdout.take()) else {
            invocation.fail();
            let _ = child.kill().await;
            progress.fail(format!("{tool}: output pipes unavailable"));
            return Err(Error::Internal(format!("{tool}: output pipes unavailable")));
        };

        // Drain stdout concurrently so a full pipe can never stall the child.
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        });

        let outcome = {
            let supervise = supervise(&mut child, stderr, &mut invocation, progress);
            tokio::select! {
                status = supervise => Outcome::Exited(status),
                _ = tokio::time::sleep(self.timeout) => Outcome::TimedOut,
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        };

        let status = match outcome {
            Outcome::Exited(Ok(status)) => status,
            Outcome::Exited(Err(e)) => {
                invocation.fail();
                stdout_task.abort();
                progress.fail(format!("{tool}: {e}"));
                return Err(Error::from(e));
            }
            Outcome::TimedOut => {
                invocation.fail();
                terminate(&mut child, &tool).await;
                stdout_task.abort();
                tracing::warn!("{tool} timed out after {:?}", self.timeout);
                progress.fail(format!("{tool} timed out after {}s", self.timeout.as_secs()));
                return Err(Error::Timeout {
                    tool,
                    after: self.timeout,
                });
            }
            Outcome::Cancelled => {
                invocation.fail();
                terminate(&mut child, &tool).await;
                stdout_task.abort();
                tracing::info!("{tool} cancelled after {}ms", invocation.elapsed().num_milliseconds());
                progress.fail(format!("{tool} cancelled"));
                return Err(Error::Cancelled(tool));
            }
        };

        let stdout = match stdout_task.await {
            Ok(Ok(buf)) => String::from_utf8_lossy(&buf).to_string(),
            Ok(Err(e)) => {
                tracing::warn!("Failed to read {tool} stdout: {e}");
                String::new()
            }
            Err(e) => {
                tracing::warn!("{tool} stdout reader failed: {e}");
                String::new()
            }
        };
        let diagnostics = invocation.diagnostic_tail();

        if !status.success() {
            invocation.fail();
            tracing::error!("{tool} exited with {status}");
            progress.fail(format!("{tool} failed ({status}): {}", diagnostics.trim()));
            return Err(Error::Process {
                tool,
                status: status.to_string(),
                diagnostics: diagnostics.trim().to_string(),
            });
        }

        invocation.succeed();
        tracing::info!(
            "{tool} finished in {}ms ({} statistics lines)",
            invocation.elapsed().num_milliseconds(),
            invocation.frames()
        );
        progress.send(100, "Complete");

        Ok(ToolOutput {
            status,
            stdout,
            stderr: diagnostics,
        })
    }
}

/// Read stderr to end-of-stream, feeding progress, then wait for exit.
async fn supervise(
    child: &mut Child,
    stderr: ChildStderr,
    invocation: &mut ProcessInvocation,
    progress: &ProgressSender,
) -> std::io::Result<ExitStatus> {
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\r\n".to_vec(), Vec::new(), MAX_DIAGNOSTIC_LINE);
    let mut lines = FramedRead::new(stderr, codec);
    let mut stopped = false;

    while let Some(frame) = lines.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Stopped reading diagnostics: {e}");
                stopped = true;
                break;
            }
        };
        let line = String::from_utf8_lossy(&frame);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        tracing::debug!("{line}");
        progress.log(line);
        if let Some(pct) = invocation.observe(line) {
            progress.send(pct, format!("Frames processed: {}", invocation.frames()));
        }
    }

    // Keep the pipe drained so the child never blocks on a full stderr.
    if stopped {
        let mut rest = lines.into_inner();
        if let Err(e) = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await {
            tracing::warn!("Failed to drain diagnostics: {e}");
        }
    }

    child.wait().await
}

/// Kill the child and reap it so no orphan outlives the run.
async fn terminate(child: &mut Child, tool: &str) {
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill {tool}: {e}");
    }
}
