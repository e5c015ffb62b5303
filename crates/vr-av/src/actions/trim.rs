//! Cut a section out of the current media without re-encoding.

use std::path::Path;

use chrono::{DateTime, Utc};
use vr_core::{MediaReference, Result, Timestamp};

use super::RunContext;
use crate::command::{ToolCommand, ToolOutput};
use crate::tools::ToolRegistry;

/// File name for a trim result, unique per millisecond.
///
/// Keeps the source container so that stream copy stays valid.
pub fn trim_output_name(media: &MediaReference, now: DateTime<Utc>) -> String {
    let ext = media.extension().unwrap_or_else(|| "mp4".to_string());
    format!("trim_{}.{ext}", now.timestamp_millis())
}

/// `ffmpeg -i <input> -ss <start> -to <end> -c copy <output>`
pub fn trim_command(
    tools: &ToolRegistry,
    media: &MediaReference,
    start: &Timestamp,
    end: &Timestamp,
    output: &Path,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(tools.program("ffmpeg"));
    cmd.arg("-i");
    cmd.path_arg(media.path());
    cmd.args(["-ss", start.as_str(), "-to", end.as_str()]);
    cmd.args(["-c", "copy"]);
    cmd.path_arg(output);
    cmd
}

/// Trim `media` to `[start, end]`, writing the result to `output`.
pub async fn trim(
    ctx: &RunContext<'_>,
    media: &MediaReference,
    start: &Timestamp,
    end: &Timestamp,
    output: &Path,
) -> Result<ToolOutput> {
    tracing::info!(
        "trim {} [{start} -> {end}] -> {}",
        media.display_name(),
        output.display()
    );

    let mut cmd = trim_command(ctx.tools, media, start, end, output);
    cmd.timeout(ctx.timeout);
    cmd.run(ctx.progress, ctx.cancel).await
}
