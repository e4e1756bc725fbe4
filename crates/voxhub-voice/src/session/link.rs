//! The session's view of its device connection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use voxhub_core::contracts::{McpMessage, ServerMessage};
use voxhub_mcp::{McpError, Outbound};

use crate::error::VoiceError;
use crate::transmit::FrameSink;

/// WebSocket close code for a normal shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Outbound half of a device connection.
///
/// Implemented by the HTTP adapter. Writes are expected to enforce their
/// own deadline and report a missed one as [`VoiceError::Transport`].
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), VoiceError>;

    async fn send_binary(&self, data: Vec<u8>) -> Result<(), VoiceError>;

    /// Ask the connection to close with `code`. Idempotent.
    async fn close(&self, code: u16, reason: &str);
}

/// Serialize a server message with the session id and send it.
pub(crate) async fn send_message(
    link: &dyn DeviceLink,
    session_id: &str,
    message: &ServerMessage,
) -> Result<(), VoiceError> {
    let text = message
        .to_json(Some(session_id))
        .map_err(|e| VoiceError::Transport(format!("encode message: {e}")))?;
    link.send_text(text).await
}

/// Audio frames go out as binary messages.
pub(crate) struct LinkFrames(pub Arc<dyn DeviceLink>);

#[async_trait]
impl FrameSink for LinkFrames {
    async fn send_frame(&self, packet: &[u8]) -> Result<(), VoiceError> {
        self.0.send_binary(packet.to_vec()).await
    }
}

/// MCP payloads go out wrapped in `mcp` envelopes.
pub(crate) struct McpOutbound {
    pub link: Arc<dyn DeviceLink>,
    pub session_id: String,
}

#[async_trait]
impl Outbound for McpOutbound {
    async fn send(&self, payload: Value) -> Result<(), McpError> {
        let message = ServerMessage::Mcp(McpMessage { payload });
        send_message(self.link.as_ref(), &self.session_id, &message)
            .await
            .map_err(|e| McpError::Send(e.to_string()))
    }
}
