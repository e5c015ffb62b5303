//! Play the current media in ffplay.

use vr_core::{MediaReference, Result};

use super::RunContext;
use crate::command::{ToolCommand, ToolOutput};
use crate::tools::ToolRegistry;

/// `ffplay -autoexit -i <input>`
pub fn preview_command(tools: &ToolRegistry, media: &MediaReference) -> ToolCommand {
    let mut cmd = ToolCommand::new(tools.program("ffplay"));
    cmd.args(["-autoexit", "-i"]);
    cmd.path_arg(media.path());
    cmd
}

/// Play `media` until the window is closed or playback ends.
///
/// ffplay normally prints no frame statistics, so usually the only progress
/// event is the final one.
pub async fn preview(ctx: &RunContext<'_>, media: &MediaReference) -> Result<ToolOutput> {
    tracing::info!("preview {}", media.display_name());

    let mut cmd = preview_command(ctx.tools, media);
    cmd.timeout(ctx.timeout);
    cmd.run(ctx.progress, ctx.cancel).await
}
