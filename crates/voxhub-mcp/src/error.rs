//! MCP error types.

use thiserror::Error;
use voxhub_core::ProviderError;

/// Errors that can occur on the device MCP channel.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Timeout waiting for MCP response to '{method}' after {seconds}s")]
    Timeout { method: String, seconds: u64 },

    #[error("MCP transport closed")]
    Closed,

    #[error("MCP inbound queue is full")]
    InboundFull,

    #[error("Failed to send MCP message: {0}")]
    Send(String),

    #[error("MCP device returned error: code={code}, message={message}")]
    Server { code: i64, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<McpError> for ProviderError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Server { message, .. } => Self::Tool(message),
            other => Self::request("mcp", other),
        }
    }
}
