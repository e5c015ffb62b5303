//! Media operations: trim, export and preview.
//!
//! Each operation has a pure `*_command` builder producing the exact argument
//! vector, and an async runner that executes it under a [`RunContext`].

mod export;
mod preview;
mod trim;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vr_core::ProgressSender;

use crate::tools::ToolRegistry;

pub use export::{export, export_command, muxer_for};
pub use preview::{preview, preview_command};
pub use trim::{trim, trim_command, trim_output_name};

/// Everything an operation needs besides its own arguments.
pub struct RunContext<'a> {
    /// Where to find ffmpeg / ffplay.
    pub tools: &'a ToolRegistry,
    /// Wall-clock budget for the external process.
    pub timeout: Duration,
    /// Receives progress events for the run.
    pub progress: &'a ProgressSender,
    /// Fires when the caller gives up on the run.
    pub cancel: &'a CancellationToken,
}
