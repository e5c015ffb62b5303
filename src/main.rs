mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use tokio::io::BufReader;
use vidrelay::{McpServer, ToolDispatcher};
use vr_av::ToolRegistry;
use vr_core::config::Config;

fn load_config(path: Option<&Path>) -> Config {
    let config = Config::load(path);
    for warning in config.validate() {
        tracing::warn!("Config: {warning}");
    }
    config
}

/// Locate the media tools and warn about missing ones.
///
/// Runs `-version` probes synchronously, so call it outside the runtime.
fn discover_tools(config: &Config) -> ToolRegistry {
    let tools = ToolRegistry::discover(&config.tools);
    for info in tools.check_all().iter().filter(|t| !t.available) {
        tracing::warn!("{} not found; calls that need it will fail", info.name);
    }
    tools
}

async fn serve(config: Config, tools: ToolRegistry) -> Result<()> {
    tracing::info!(
        "Serving on stdio with workspace {}",
        config.workspace.root.display()
    );

    let dispatcher = ToolDispatcher::new(Arc::new(config), Arc::new(tools));
    let server = McpServer::new(Arc::new(dispatcher));
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    tracing::info!("Client disconnected; shutting down");
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            // ffprobe is optional.
            if tool.name != "ffprobe" {
                all_ok = false;
            }
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable all features.");
    }

    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("serializing config")?;
    println!("{json}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidrelay=trace,vr_av=trace,vr_core=debug".to_string()
        } else {
            "vidrelay=info,vr_av=info,vr_core=info".to_string()
        }
    });

    // stdout carries the protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Serve => {
            config
                .ensure_directories()
                .with_context(|| format!("creating workspace {}", config.workspace.root.display()))?;
            let tools = discover_tools(&config);

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(config, tools))
        }
        Commands::CheckTools => check_tools(&config),
        Commands::ShowConfig => show_config(&config),
        Commands::Version => {
            println!("vidrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
