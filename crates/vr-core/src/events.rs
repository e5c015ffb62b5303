//! Progress notifications emitted while an external tool runs.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion estimate, 0..=100.
    pub percent: u8,
    /// Human-readable status line.
    pub message: String,
    /// Set on the final event of a failed run.
    #[serde(default)]
    pub error: bool,
}

/// Sender for reporting progress to whoever issued the call.
///
/// Wraps a callback and guarantees that the percentages it forwards are
/// clamped to 0..=100 and never decrease. An optional second callback
/// receives the tool's informational output lines.
pub struct ProgressSender {
    callback: Box<dyn Fn(ProgressEvent) + Send + Sync>,
    log: Option<Box<dyn Fn(&str) + Send + Sync>>,
    last: AtomicU8,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            log: None,
            last: AtomicU8::new(0),
        }
    }

    /// Also forward informational lines to `log`.
    pub fn with_log(mut self, log: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Create a sender paired with a receiver that yields every event.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self::new(move |event| {
            // The receiver going away just means nobody is listening anymore.
            let _ = tx.send(event);
        });
        (sender, rx)
    }

    /// Report progress.
    pub fn send(&self, percent: u32, message: impl Into<String>) {
        self.emit(percent, message.into(), false);
    }

    /// Report a terminal failure. Always carries 100%.
    pub fn fail(&self, message: impl Into<String>) {
        self.emit(100, message.into(), true);
    }

    /// Forward one informational line; dropped when no log callback is set.
    pub fn log(&self, line: &str) {
        if let Some(ref log) = self.log {
            log(line);
        }
    }

    /// Highest percentage forwarded so far.
    pub fn last_percent(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    fn emit(&self, percent: u32, message: String, error: bool) {
        let clamped = percent.min(100) as u8;
        let previous = self.last.fetch_max(clamped, Ordering::SeqCst);
        let percent = previous.max(clamped);
        (self.callback)(ProgressEvent {
            percent,
            message,
            error,
        });
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender")
            .field("last", &self.last_percent())
            .finish_non_exhaustive()
    }
}
