//! JSON envelopes exchanged with devices over the WebSocket.
//!
//! Every text frame is an object with a `type` discriminator and an optional
//! `session_id`. Binary frames carry compressed audio and are not modelled here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::AudioParams;

/// Transport name reported in the server hello.
pub const TRANSPORT_WEBSOCKET: &str = "websocket";

/// Protocol version reported in the server hello.
pub const PROTOCOL_VERSION: u32 = 1;

/// Errors from decoding a device text frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

// ── Device → server ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloFeatures {
    #[serde(default)]
    pub mcp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub features: HelloFeatures,
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub audio_params: Option<AudioParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenState {
    Start,
    Stop,
    Detect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenMessage {
    pub state: ListenState,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ListenMessage {
    /// `start` in `auto` mode begins server-side capture.
    #[must_use]
    pub fn starts_auto_capture(&self) -> bool {
        self.state == ListenState::Start && self.mode.as_deref() == Some("auto")
    }

    /// Text that should become a turn directly, if any.
    #[must_use]
    pub fn turn_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortMessage {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Opaque MCP JSON-RPC payload, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpMessage {
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IotMessage {
    #[serde(flatten)]
    pub body: serde_json::Map<String, Value>,
}

/// A decoded device text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello(HelloMessage),
    Listen(ListenMessage),
    Abort(AbortMessage),
    Mcp(McpMessage),
    Iot(IotMessage),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

impl ClientMessage {
    const KNOWN_TYPES: [&'static str; 5] = ["hello", "listen", "abort", "mcp", "iot"];

    /// Decode a text frame, distinguishing unknown types from malformed JSON.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let envelope = Envelope::deserialize(&value)?;
        if !Self::KNOWN_TYPES.contains(&envelope.kind.as_str()) {
            return Err(ProtocolError::UnknownType(envelope.kind));
        }
        Ok(serde_json::from_value(value)?)
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Listen(_) => "listen",
            Self::Abort(_) => "abort",
            Self::Mcp(_) => "mcp",
            Self::Iot(_) => "iot",
        }
    }
}

// ── Server → device ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    pub version: u32,
    pub transport: String,
    pub audio_params: AudioParams,
}

impl ServerHello {
    /// The reply every device gets, regardless of what it asked for.
    #[must_use]
    pub fn locked() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            transport: TRANSPORT_WEBSOCKET.to_string(),
            audio_params: AudioParams::server_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    Stop,
    SentenceStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsMessage {
    pub state: TtsState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
}

impl TtsMessage {
    #[must_use]
    pub const fn start(sample_rate: u32) -> Self {
        Self {
            state: TtsState::Start,
            text: None,
            sample_rate: Some(sample_rate),
        }
    }

    #[must_use]
    pub const fn stop() -> Self {
        Self {
            state: TtsState::Stop,
            text: None,
            sample_rate: None,
        }
    }

    #[must_use]
    pub fn sentence_start(text: impl Into<String>) -> Self {
        Self {
            state: TtsState::SentenceStart,
            text: Some(text.into()),
            sample_rate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SttMessage {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

/// A server text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Hello(ServerHello),
    Tts(TtsMessage),
    Stt(SttMessage),
    Llm(LlmMessage),
    Mcp(McpMessage),
}

#[derive(Serialize)]
struct ServerFrame<'a> {
    #[serde(flatten)]
    message: &'a ServerMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

impl ServerMessage {
    /// Serialize with the session id attached to the envelope.
    pub fn to_json(&self, session_id: Option<&str>) -> Result<String, serde_json::Error> {
        serde_json::to_string(&ServerFrame {
            message: self,
            session_id,
        })
    }
}
