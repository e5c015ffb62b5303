//! Unified error type for vidrelay.
//!
//! Every failure a tool call can produce funnels into [`Error`]. Failed tool
//! calls are reported to the client with [`Error::kind`] and
//! [`Error::rpc_code`] attached, and never terminate the server.

use std::time::Duration;

/// Error taxonomy covering all failure modes of a tool call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing arguments, bad timestamps, unsupported or missing
    /// files, over-long file names.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A path resolved outside of the sandboxed directory.
    #[error("Security error: {0}")]
    Security(String),

    /// The external tool could not be launched.
    #[error("Failed to launch {tool}: {message}")]
    Spawn {
        /// Name of the tool that failed to start.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The external tool ran but exited unsuccessfully.
    #[error("{tool} exited with status {status}: {diagnostics}")]
    Process {
        /// Name of the tool that failed.
        tool: String,
        /// Exit status as reported by the OS.
        status: String,
        /// Tail of the tool's diagnostic output.
        diagnostics: String,
    },

    /// The external tool exceeded its time budget and was killed.
    #[error("{tool} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Name of the tool that was killed.
        tool: String,
        /// The configured time budget.
        after: Duration,
    },

    /// The caller cancelled the operation; any running tool was killed.
    #[error("{0} cancelled")]
    Cancelled(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable, machine-readable label for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Security(_) => "security",
            Error::Spawn { .. } => "spawn",
            Error::Process { .. } => "process",
            Error::Timeout { .. } => "timeout",
            Error::Cancelled(_) => "cancelled",
            Error::Io { .. } => "io",
            Error::Internal(_) => "internal",
        }
    }

    /// Map this error to a JSON-RPC error code.
    ///
    /// Caller mistakes use the standard `-32602` (invalid params); everything
    /// else lives in the implementation-defined server range.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Error::InvalidInput(_) => -32602,
            Error::Security(_) => -32001,
            Error::Spawn { .. } => -32002,
            Error::Process { .. } => -32003,
            Error::Timeout { .. } => -32004,
            Error::Cancelled(_) => -32800,
            Error::Io { .. } => -32005,
            Error::Internal(_) => -32603,
        }
    }

    /// Whether the caller can fix this by retrying with different input.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Security(_))
    }

    /// Convenience constructor for [`Error::InvalidInput`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// Convenience constructor for [`Error::Security`].
    pub fn security(message: impl Into<String>) -> Self {
        Error::Security(message.into())
    }

    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Spawn {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
