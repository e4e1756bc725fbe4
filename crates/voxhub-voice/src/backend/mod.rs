//! OpenAI-compatible HTTP backends for speech recognition and synthesis.
//!
//! Both clients implement the core collaborator ports, so sessions never see
//! HTTP types. Any server exposing `/audio/transcriptions` or `/audio/speech`
//! (OpenAI, Groq, local whisper/kokoro servers) works.

mod openai_stt;
mod openai_tts;

pub use openai_stt::{OpenAiStt, OpenAiSttConfig};
pub use openai_tts::{OpenAiTts, OpenAiTtsConfig, PCM_SAMPLE_RATE};

use voxhub_core::ProviderError;

/// Join a base URL and a path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Turn a non-success response into a [`ProviderError::Status`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        provider: provider.to_string(),
        status: status.as_u16(),
        body,
    })
}
