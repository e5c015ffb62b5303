use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidrelay")]
#[command(author, version, about = "Sandboxed video editing tools over stdio JSON-RPC")]
pub struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the editing tools on stdin/stdout
    Serve,

    /// Check that ffmpeg and ffplay are available
    CheckTools,

    /// Print the effective configuration as JSON
    ShowConfig,

    /// Display version information
    Version,
}
