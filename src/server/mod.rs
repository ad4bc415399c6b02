// MCP server shell — wire types and the stdio loop

pub mod protocol;
pub mod stdio;

pub use stdio::McpServer;
