#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod contracts;
pub mod domain;
pub mod memory;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    AgentConfig, AudioParams, DEVICE_CHANNELS, DEVICE_SAMPLE_RATE, DeviceRecord, DeviceStatus,
    FRAME_DURATION_MS, HistoryEntry, HistoryRole, OPUS_FORMAT, SAMPLES_PER_FRAME, SessionEvent,
    SessionInfo, SessionState, SynthesizedAudio, Utterance, UtteranceStatus,
    split_response_lines,
};
pub use memory::MemoryStore;
pub use ports::{
    AgentRepository, ChatMessage, ChatModel, ChatReply, ChatRequest, ChatRole, DeviceRepository,
    HistoryRepository, ProviderError, Providers, SessionRepository, SpeechSynthesizer,
    SpeechToText, StoreError, Stores, ToolCall, ToolExecutor, ToolOutput, ToolSpec,
};
pub use settings::{
    AdmissionSettings, EnvConfig, HubSettings, ProviderSettings, SettingsError,
};
