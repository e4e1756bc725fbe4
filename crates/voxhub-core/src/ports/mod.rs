//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the session engine expects from speech,
//! language and storage backends. They use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP or codec types in any signature
//! - One trait per capability; backends are injected at session construction
//! - Calls are request/response; retry policy belongs to the implementation

pub mod llm;
pub mod store;
pub mod stt;
pub mod tools;
pub mod tts;

use std::sync::Arc;
use thiserror::Error;

pub use llm::{ChatMessage, ChatModel, ChatReply, ChatRequest, ChatRole, ToolCall, ToolSpec};
pub use store::{
    AgentRepository, DeviceRepository, HistoryRepository, SessionRepository, StoreError,
};
pub use stt::SpeechToText;
pub use tools::{ToolExecutor, ToolOutput};
pub use tts::SpeechSynthesizer;

/// Failure of a collaborator call (STT, LLM, TTS or tool).
///
/// A provider error abandons the segment, turn or line it belongs to. The
/// session itself continues.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool call failed: {0}")]
    Tool(String),
}

impl ProviderError {
    pub fn request(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Request {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(provider: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            provider: provider.into(),
            message: message.to_string(),
        }
    }
}

/// Container for all record store trait objects.
///
/// Lives in core so the session engine can accept it without depending on
/// a concrete store.
#[derive(Clone)]
pub struct Stores {
    pub devices: Arc<dyn DeviceRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub agents: Arc<dyn AgentRepository>,
}

impl Stores {
    pub fn new(
        devices: Arc<dyn DeviceRepository>,
        sessions: Arc<dyn SessionRepository>,
        history: Arc<dyn HistoryRepository>,
        agents: Arc<dyn AgentRepository>,
    ) -> Self {
        Self {
            devices,
            sessions,
            history,
            agents,
        }
    }

    /// Wire every port to one backing store.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: DeviceRepository + SessionRepository + HistoryRepository + AgentRepository + 'static,
    {
        Self {
            devices: store.clone(),
            sessions: store.clone(),
            history: store.clone(),
            agents: store,
        }
    }
}

/// Collaborator backends injected into every session.
#[derive(Clone)]
pub struct Providers {
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn SpeechSynthesizer>,
    pub chat: Arc<dyn ChatModel>,
}

impl Providers {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn SpeechSynthesizer>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self { stt, tts, chat }
    }
}
