//! Wire contracts shared between the session engine and the HTTP adapter.

pub mod ws;

pub use ws::{
    AbortMessage, ClientMessage, HelloFeatures, HelloMessage, IotMessage, ListenMessage,
    ListenState, LlmMessage, McpMessage, PROTOCOL_VERSION, ProtocolError, ServerHello,
    ServerMessage, SttMessage, TRANSPORT_WEBSOCKET, TtsMessage, TtsState,
};
