//! vidrelay - a sandboxed video editing tool server.
//!
//! The library crate exposes the session, dispatcher and stdio transport so
//! that integration tests can drive them directly.

pub mod dispatcher;
pub mod mcp;
pub mod session;

pub use dispatcher::{ContentBlock, ToolDispatcher, ToolName, ToolReply, ToolRequest};
pub use mcp::McpServer;
pub use session::{Session, SessionGuard};
