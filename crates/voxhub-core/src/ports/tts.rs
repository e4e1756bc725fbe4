//! Speech synthesis collaborator port.

use async_trait::async_trait;

use super::ProviderError;
use crate::domain::SynthesizedAudio;

/// Turns one line of text into raw PCM.
///
/// The returned artifact describes its own sample rate, channel count and
/// bit depth; the transmitter resamples it to the device format.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, ProviderError>;
}
