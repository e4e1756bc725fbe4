//! Voice engine error types.

use voxhub_core::ProviderError;

/// Errors that can occur in the voice session engine.
///
/// Per-frame, per-segment and per-line variants (`Decode`, `Provider`) are
/// isolated by their callers. Only `Transport` ends a session.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// A single compressed frame could not be decoded.
    #[error("Opus decode failed: {0}")]
    Decode(String),

    /// A PCM frame could not be encoded.
    #[error("Opus encode failed: {0}")]
    Encode(String),

    /// The codec could not be created.
    #[error("Opus codec init failed: {0}")]
    Codec(String),

    /// Audio resampling error.
    #[error("Audio resampling failed: {0}")]
    Resample(String),

    /// WAV container could not be written.
    #[error("WAV encoding failed: {0}")]
    Wav(String),

    /// Synthesized audio uses a layout the transmitter cannot convert.
    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    /// Voice activity model could not be loaded.
    #[error("Failed to load VAD model: {0}")]
    VadModel(String),

    /// A collaborator (STT/LLM/TTS) call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// A connection write failed or missed its deadline.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A deadline expired.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    /// A bounded queue was full.
    #[error("{0} queue is full")]
    QueueFull(&'static str),

    /// Capture has not been started.
    #[error("Capture is not active")]
    NotActive,

    /// Operation was cancelled.
    #[error("Voice operation cancelled")]
    Cancelled,
}

impl VoiceError {
    /// Whether this error must tear down the whole session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
