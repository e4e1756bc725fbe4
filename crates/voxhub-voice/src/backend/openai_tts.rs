//! Synthesis via `POST {base}/audio/speech`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use voxhub_core::{ProviderError, ProviderSettings, SpeechSynthesizer, SynthesizedAudio};

use super::{check_status, endpoint};
use crate::error::VoiceError;
use crate::wav;

const PROVIDER: &str = "tts";

/// Rate of raw `pcm` responses (16-bit little-endian mono).
pub const PCM_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone)]
pub struct OpenAiTtsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub timeout: Duration,
}

impl OpenAiTtsConfig {
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings.tts_base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.tts_model.clone(),
            voice: settings.tts_voice.clone(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

pub struct OpenAiTts {
    client: reqwest::Client,
    config: OpenAiTtsConfig,
}

impl OpenAiTts {
    pub fn new(config: OpenAiTtsConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VoiceError::Provider(ProviderError::request(PROVIDER, e)))?;
        Ok(Self { client, config })
    }
}

/// Interpret a response body: WAV if it has a RIFF header, raw PCM otherwise.
fn audio_from_body(body: &[u8]) -> Result<SynthesizedAudio, ProviderError> {
    if wav::is_wav(body) {
        return wav::decode_wav(body).map_err(|e| ProviderError::decode(PROVIDER, e));
    }
    if body.len() % 2 != 0 {
        return Err(ProviderError::decode(
            PROVIDER,
            "odd byte count for 16-bit PCM",
        ));
    }
    Ok(SynthesizedAudio::pcm16(body.to_vec(), PCM_SAMPLE_RATE, 1))
}

#[async_trait]
impl SpeechSynthesizer for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, ProviderError> {
        let mut request = self
            .client
            .post(endpoint(&self.config.base_url, "audio/speech"))
            .json(&SpeechRequest {
                model: &self.config.model,
                input: text,
                voice: &self.config.voice,
                response_format: "pcm",
            });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;

        let audio = audio_from_body(&body)?;
        tracing::debug!(
            bytes = audio.content.len(),
            duration_ms = audio.duration().as_millis(),
            "Speech synthesized"
        );
        Ok(audio)
    }
}
