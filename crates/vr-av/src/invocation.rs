//! Lifecycle and progress bookkeeping for a single external tool run.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Substring that marks an ffmpeg statistics line.
pub const PROGRESS_MARKER: &str = "frame=";

/// Matching lines per emitted progress step.
pub const LINES_PER_STEP: u64 = 30;

/// Highest percentage the heuristic reports before the process exits.
pub const MAX_RUNNING_PERCENT: u32 = 95;

/// Diagnostic lines retained for error reporting.
pub const DIAGNOSTIC_TAIL_LINES: usize = 50;

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl InvocationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Crude completion estimate from the number of statistics lines seen.
///
/// The total frame count is unknown up front, so every
/// [`LINES_PER_STEP`]th matching line bumps the estimate by one percent,
/// capped at [`MAX_RUNNING_PERCENT`].
#[derive(Debug, Default, Clone)]
pub struct FrameProgress {
    matched: u64,
}

impl FrameProgress {
    /// Feed one diagnostic line; returns a percentage when a step is due.
    pub fn observe(&mut self, line: &str) -> Option<u32> {
        if !line.contains(PROGRESS_MARKER) {
            return None;
        }
        self.matched += 1;
        if self.matched % LINES_PER_STEP != 0 {
            return None;
        }
        let steps = self.matched / LINES_PER_STEP;
        Some(steps.min(MAX_RUNNING_PERCENT as u64) as u32)
    }

    /// Matching lines seen so far.
    pub fn matched(&self) -> u64 {
        self.matched
    }
}

/// One external process run: its arguments, timing, progress and outcome.
#[derive(Debug)]
pub struct ProcessInvocation {
    argv: Vec<String>,
    state: InvocationState,
    started_at: Option<DateTime<Utc>>,
    progress: FrameProgress,
    tail: VecDeque<String>,
}

impl ProcessInvocation {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            state: InvocationState::Pending,
            started_at: None,
            progress: FrameProgress::default(),
            tail: VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES),
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// Wall-clock time since the process was spawned.
    pub fn elapsed(&self) -> chrono::Duration {
        self.started_at
            .map(|t| Utc::now() - t)
            .unwrap_or_else(chrono::Duration::zero)
    }

    /// Space-joined argument vector, for log lines only.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// Pending -> Running.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, InvocationState::Pending);
        self.state = InvocationState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Running -> Succeeded.
    pub fn succeed(&mut self) {
        debug_assert_eq!(self.state, InvocationState::Running);
        self.state = InvocationState::Succeeded;
    }

    /// Pending or Running -> Failed.
    pub fn fail(&mut self) {
        debug_assert!(!self.state.is_terminal());
        self.state = InvocationState::Failed;
    }

    /// Record a diagnostic line and return a progress percentage when due.
    pub fn observe(&mut self, line: &str) -> Option<u32> {
        if self.tail.len() == DIAGNOSTIC_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
        self.progress.observe(line)
    }

    /// Statistics lines seen so far.
    pub fn frames(&self) -> u64 {
        self.progress.matched()
    }

    /// The last diagnostic lines, newline-joined.
    pub fn diagnostic_tail(&self) -> String {
        self.tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}
