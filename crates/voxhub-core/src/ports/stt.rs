//! Speech-to-text collaborator port.

use async_trait::async_trait;

use super::ProviderError;

/// Transcribes one complete speech segment.
///
/// Implementations receive a canonical WAV container (16 kHz, mono, 16-bit)
/// and return the raw transcript. Callers trim the result themselves.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, ProviderError>;
}
