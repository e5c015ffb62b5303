//! Stream-copy the current media into a named output file.

use std::path::Path;

use vr_core::{MediaReference, Result};

use super::RunContext;
use crate::command::{ToolCommand, ToolOutput};
use crate::tools::ToolRegistry;

/// ffmpeg muxer for a container extension (no dot, any case).
pub fn muxer_for(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => Some("mp4"),
        "mov" => Some("mov"),
        "mkv" => Some("matroska"),
        "webm" => Some("webm"),
        "avi" => Some("avi"),
        _ => None,
    }
}

/// `ffmpeg -i <input> -c copy [-f <muxer>] <output>`
///
/// ffmpeg picks the container from the output extension. When the requested
/// name has no recognizable one, the source container is forced with `-f`.
pub fn export_command(tools: &ToolRegistry, media: &MediaReference, output: &Path) -> ToolCommand {
    let mut cmd = ToolCommand::new(tools.program("ffmpeg"));
    cmd.arg("-i");
    cmd.path_arg(media.path());
    cmd.args(["-c", "copy"]);

    let output_known = output
        .extension()
        .and_then(|e| muxer_for(&e.to_string_lossy()))
        .is_some();
    if !output_known {
        if let Some(muxer) = media.extension().as_deref().and_then(muxer_for) {
            cmd.args(["-f", muxer]);
        }
    }

    cmd.path_arg(output);
    cmd
}

/// Export `media` to `output`.
pub async fn export(
    ctx: &RunContext<'_>,
    media: &MediaReference,
    output: &Path,
) -> Result<ToolOutput> {
    tracing::info!("export {} -> {}", media.display_name(), output.display());

    let mut cmd = export_command(ctx.tools, media, output);
    cmd.timeout(ctx.timeout);
    cmd.run(ctx.progress, ctx.cancel).await
}
