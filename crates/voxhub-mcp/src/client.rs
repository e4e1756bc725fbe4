//! MCP client for the tools a device exposes.
//!
//! Speaks the client half of MCP over a [`Multiplexer`].
//! Reference: <https://spec.modelcontextprotocol.io/>

use serde::Deserialize;
use serde_json::{Value, json};
use voxhub_core::{ToolOutput, ToolSpec};

use crate::error::McpError;
use crate::transport::Multiplexer;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on `tools/list` pages, in case a device keeps returning a cursor.
const MAX_TOOL_PAGES: usize = 16;

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
    #[serde(rename = "serverInfo", default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub capabilities: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolSchema {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "inputSchema")]
    input_schema: Option<Value>,
}

impl From<ToolSchema> for ToolSpec {
    fn from(tool: ToolSchema) -> Self {
        Self {
            name: tool.name,
            description: tool.description.unwrap_or_default(),
            input_schema: tool
                .input_schema
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<ToolSchema>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct McpClient {
    mux: Multiplexer,
}

impl McpClient {
    #[must_use]
    pub const fn new(mux: Multiplexer) -> Self {
        Self { mux }
    }

    #[must_use]
    pub const fn transport(&self) -> &Multiplexer {
        &self.mux
    }

    /// Run the initialize handshake and announce readiness.
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": "voxhub",
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let result = self.mux.send_request("initialize", Some(params), None).await?;
        let result: InitializeResult = serde_json::from_value(result)?;

        self.mux
            .send_notification("notifications/initialized", None)
            .await?;

        tracing::info!(
            server = result.server_info.as_ref().map_or("unknown", |s| s.name.as_str()),
            protocol = result.protocol_version.as_deref().unwrap_or("unknown"),
            "MCP initialized"
        );
        Ok(result)
    }

    /// List every tool the device offers, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self.mux.send_request("tools/list", params, None).await?;
            let page: ToolsPage = serde_json::from_value(result)?;
            tools.extend(page.tools.into_iter().map(ToolSpec::from));

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(pages = MAX_TOOL_PAGES, "MCP tool listing truncated");
        Ok(tools)
    }

    /// Call a tool on the device.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput, McpError> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        let params = json!({ "name": name, "arguments": arguments });
        let result = self.mux.send_request("tools/call", Some(params), None).await?;

        let text = content_text(result.get("content"));
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(if is_error {
            ToolOutput::error(if text.is_empty() {
                "Unknown error".to_string()
            } else {
                text
            })
        } else {
            ToolOutput::ok(text)
        })
    }
}

/// Join the text items of an MCP content array; non-text items are kept as JSON.
fn content_text(content: Option<&Value>) -> String {
    let Some(items) = content.and_then(Value::as_array) else {
        return String::new();
    };
    items
        .iter()
        .map(|item| {
            item.get("text")
                .and_then(Value::as_str)
                .map_or_else(|| item.to_string(), ToString::to_string)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_text_joins_text_items() {
        let content = json!([
            {"type": "text", "text": "volume set"},
            {"type": "text", "text": "to 40"}
        ]);
        assert_eq!(content_text(Some(&content)), "volume set\nto 40");
        assert_eq!(content_text(None), "");
    }

    #[test]
    fn tool_schema_defaults() {
        let schema: ToolSchema = serde_json::from_value(json!({"name": "self.get_status"})).unwrap();
        let spec = ToolSpec::from(schema);
        assert_eq!(spec.name, "self.get_status");
        assert_eq!(spec.description, "");
        assert_eq!(spec.input_schema["type"], "object");
    }
}
