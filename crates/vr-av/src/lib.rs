//! # vr-av
//!
//! External media tool supervision for the vidrelay server.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffplay and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async runner that streams
//!   stderr into progress events and enforces timeout and cancellation.
//! - **Run bookkeeping** ([`ProcessInvocation`]) -- lifecycle state, frame
//!   heuristic and diagnostic tail for one run.
//! - **Operations** ([`actions`]) -- trim, export and preview.

pub mod actions;
pub mod command;
pub mod invocation;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use invocation::{FrameProgress, InvocationState, ProcessInvocation};
pub use tools::{ToolInfo, ToolRegistry};

pub use actions::RunContext;
