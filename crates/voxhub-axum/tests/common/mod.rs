//! Shared fakes for voxhub-axum integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use voxhub_core::{
    AgentConfig, ChatModel, ChatReply, ChatRequest, MemoryStore, ProviderError, Providers,
    SessionInfo, SpeechSynthesizer, SpeechToText, Stores, SynthesizedAudio,
};
use voxhub_voice::{DeviceLink, Session, SessionConfig, SessionDeps, VoiceError};

pub struct SilentStt;

#[async_trait]
impl SpeechToText for SilentStt {
    async fn transcribe(&self, _wav: Vec<u8>) -> Result<String, ProviderError> {
        Ok(String::new())
    }
}

pub struct SilentTts;

#[async_trait]
impl SpeechSynthesizer for SilentTts {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, ProviderError> {
        Ok(SynthesizedAudio::from_samples(&[0; 960], 16_000, 1))
    }
}

pub struct EchoChat;

#[async_trait]
impl ChatModel for EchoChat {
    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, ProviderError> {
        let last = request
            .messages
            .last()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ChatReply::Text(last))
    }
}

/// Drops everything written to it.
pub struct NullLink;

#[async_trait]
impl DeviceLink for NullLink {
    async fn send_text(&self, _text: String) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn send_binary(&self, _data: Vec<u8>) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn close(&self, _code: u16, _reason: &str) {}
}

pub fn providers() -> Providers {
    Providers::new(Arc::new(SilentStt), Arc::new(SilentTts), Arc::new(EchoChat))
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(AgentConfig::default()))
}

/// A running session on a link nobody reads.
pub fn session(store: &Arc<MemoryStore>, device_id: &str, session_id: &str) -> Arc<Session> {
    let deps = SessionDeps {
        providers: providers(),
        stores: Stores::shared(store.clone()),
        link: Arc::new(NullLink),
    };
    Session::spawn(
        SessionInfo::new(session_id, device_id, "client-1"),
        AgentConfig::default(),
        deps,
        &SessionConfig::default(),
    )
    .unwrap()
}
