//! MCP (Model Context Protocol) server implementation
//!
//! Exposes the query engine over stdio as JSON-RPC tools.

mod server;
mod tools;
mod types;

pub use server::McpServer;
pub use tools::{get_tool_definitions, ToolContext};
pub use types::{McpError, McpRequest, McpResponse, ToolDefinition, ToolResult};
