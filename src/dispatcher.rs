//! Tool dispatch: map a tool name and argument object onto session and
//! process operations, and package the outcome as a reply.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use vr_av::actions::{self, RunContext};
use vr_av::{ToolOutput, ToolRegistry};
use vr_core::config::Config;
use vr_core::{Error, PathGuard, ProgressSender, Result, Timestamp};

use crate::session::Session;

/// A tool invocation as received from the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One block of reply content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// Ordered reply content for a successful tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolReply {
    pub content: Vec<ContentBlock>,
}

impl ToolReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// All text blocks joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The operations this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    Import,
    Trim,
    Preview,
    Export,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [Self::Import, Self::Trim, Self::Preview, Self::Export];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Trim => "trim",
            Self::Preview => "preview",
            Self::Export => "export",
        }
    }

    /// Name, description and JSON schema of the tool's arguments.
    pub fn definition(self) -> Value {
        let (description, properties, required): (&str, Value, Vec<&str>) = match self {
            Self::Import => (
                "Import the video to edit",
                json!({
                    "path": {
                        "type": "string",
                        "description": "Path of the video, absolute or relative to the workspace root. Must be inside the input directory."
                    }
                }),
                vec!["path"],
            ),
            Self::Trim => (
                "Keep only the section between two timestamps of the imported video",
                json!({
                    "timestamp_start": {
                        "type": "string",
                        "description": "Start of the section, [HH:]MM:SS[.fraction]"
                    },
                    "timestamp_end": {
                        "type": "string",
                        "description": "End of the section, [HH:]MM:SS[.fraction]"
                    }
                }),
                vec!["timestamp_start", "timestamp_end"],
            ),
            Self::Preview => ("Play the imported video", json!({}), vec![]),
            Self::Export => (
                "Export the imported video",
                json!({
                    "file_name": {
                        "type": "string",
                        "description": "Name of the exported file"
                    },
                    "path": {
                        "type": "string",
                        "description": "Directory inside the output directory; defaults to the output directory"
                    }
                }),
                vec!["file_name"],
            ),
        };

        json!({
            "name": self.as_str(),
            "description": description,
            "inputSchema": {
                "type": "object",
                "properties": properties,
                "required": required,
            }
        })
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("Unknown tool: {s}")))
    }
}

/// Definitions of every tool, for `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    ToolName::ALL.into_iter().map(ToolName::definition).collect()
}

/// Routes tool calls to the session and the media tools.
#[derive(Debug)]
pub struct ToolDispatcher {
    config: Arc<Config>,
    guard: PathGuard,
    tools: Arc<ToolRegistry>,
    session: Session,
}

impl ToolDispatcher {
    pub fn new(config: Arc<Config>, tools: Arc<ToolRegistry>) -> Self {
        let guard = PathGuard::from_config(&config);
        Self {
            config,
            guard,
            tools,
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run one tool call to completion.
    ///
    /// Arguments are validated before the session is touched or anything is
    /// spawned.
    pub async fn dispatch(
        &self,
        request: &ToolRequest,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ToolReply> {
        let tool: ToolName = request.name.parse()?;
        let args = &request.arguments;
        tracing::info!("Tool call: {tool}");

        let result = match tool {
            ToolName::Import => self.import(args, cancel).await,
            ToolName::Trim => self.trim(args, progress, cancel).await,
            ToolName::Preview => self.preview(progress, cancel).await,
            ToolName::Export => self.export(args, progress, cancel).await,
        };

        match result {
            Err(ref e) if e.is_caller_error() => {
                tracing::warn!("Tool call {tool} rejected ({}): {e}", e.kind())
            }
            Err(ref e) => tracing::error!("Tool call {tool} failed ({}): {e}", e.kind()),
            Ok(_) => {}
        }
        result
    }

    async fn import(&self, args: &Map<String, Value>, cancel: &CancellationToken) -> Result<ToolReply> {
        let raw = required_str(args, "path")?;
        let path = self.guard.resolve_input(raw);

        let mut session = self.session.lock(cancel).await?;
        let media = session.import(&self.guard, &path)?;
        Ok(ToolReply::text(format!(
            "Successfully imported video: {}",
            media.display_name()
        )))
    }

    async fn trim(
        &self,
        args: &Map<String, Value>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ToolReply> {
        let start = Timestamp::parse(required_str(args, "timestamp_start")?)?;
        let end = Timestamp::parse(required_str(args, "timestamp_end")?)?;
        if start.seconds() >= end.seconds() {
            return Err(Error::invalid(format!(
                "timestamp_start ({start}) must be before timestamp_end ({end})"
            )));
        }

        let session = self.session.lock(cancel).await?;
        let media = session.current()?;
        let name = actions::trim_output_name(media, Utc::now());
        let output = self.guard.output_path(self.guard.output_dir(), &name)?;

        let out = actions::trim(&self.run_context(progress, cancel), media, &start, &end, &output).await?;
        Ok(reply_from(out, format!("Success: trimmed clip written to {}", output.display())))
    }

    async fn preview(&self, progress: &ProgressSender, cancel: &CancellationToken) -> Result<ToolReply> {
        let session = self.session.lock(cancel).await?;
        let media = session.current()?;

        let out = actions::preview(&self.run_context(progress, cancel), media).await?;
        Ok(reply_from(out, "Preview finished"))
    }

    async fn export(
        &self,
        args: &Map<String, Value>,
        progress: &ProgressSender,
        cancel: &CancellationToken,
    ) -> Result<ToolReply> {
        let file_name = required_str(args, "file_name")?;
        let raw_dir = optional_str(args, "path")?;

        let session = self.session.lock(cancel).await?;
        let media = session.current()?;

        let dir = self.guard.resolve_output_dir(raw_dir)?;
        let output = self.guard.output_path(&dir, file_name)?;

        let out = actions::export(&self.run_context(progress, cancel), media, &output).await?;
        Ok(reply_from(out, format!("Success: exported video to {}", output.display())))
    }

    fn run_context<'a>(
        &'a self,
        progress: &'a ProgressSender,
        cancel: &'a CancellationToken,
    ) -> RunContext<'a> {
        RunContext {
            tools: &self.tools,
            timeout: self.config.limits.process_timeout,
            progress,
            cancel,
        }
    }
}

/// Reply with the tool's stdout, or `fallback` when it printed nothing.
fn reply_from(out: ToolOutput, fallback: impl Into<String>) -> ToolReply {
    let stdout = out.stdout.trim();
    if stdout.is_empty() {
        ToolReply::text(fallback)
    } else {
        ToolReply::text(stdout)
    }
}

fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    match args.get(key) {
        None | Some(Value::Null) => Err(Error::invalid(format!("Missing required argument: {key}"))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(Error::invalid(format!("Argument {key} must be a string"))),
    }
}

fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::invalid(format!("Argument {key} must be a string"))),
    }
}
