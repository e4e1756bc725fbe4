//! Transcription via `POST {base}/audio/transcriptions`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use voxhub_core::{ProviderError, ProviderSettings, SpeechToText};

use super::{check_status, endpoint};
use crate::error::VoiceError;

const PROVIDER: &str = "stt";

#[derive(Debug, Clone)]
pub struct OpenAiSttConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub language: Option<String>,
    pub timeout: Duration,
}

impl OpenAiSttConfig {
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            base_url: settings.stt_base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.stt_model.clone(),
            language: settings.stt_language.clone(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct OpenAiStt {
    client: reqwest::Client,
    config: OpenAiSttConfig,
}

impl OpenAiStt {
    pub fn new(config: OpenAiSttConfig) -> Result<Self, VoiceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VoiceError::Provider(ProviderError::request(PROVIDER, e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl SpeechToText for OpenAiStt {
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String, ProviderError> {
        let file = Part::bytes(wav)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let mut form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone());
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        let mut request = self
            .client
            .post(endpoint(&self.config.base_url, "audio/transcriptions"))
            .multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::request(PROVIDER, e))?;
        let response = check_status(PROVIDER, response).await?;
        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(PROVIDER, e))?;

        tracing::debug!(chars = body.text.len(), "Transcription received");
        Ok(body.text)
    }
}
