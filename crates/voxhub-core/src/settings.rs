//! Hub settings and validation.
//!
//! Settings are read from `VOXHUB_*` environment variables (after `.env` has
//! been loaded by the binary). Every value has a default, so an empty
//! environment yields a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default base URL for the OpenAI-compatible transcription API.
pub const DEFAULT_STT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default base URL for chat completions and speech synthesis.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Session engine timing and capacity settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSettings {
    /// Deadline for one chat model turn.
    pub llm_timeout: Duration,
    /// Deadline for an MCP request when the caller supplies none.
    pub mcp_request_timeout: Duration,
    /// How often the turn worker checks whether the agent context is ready.
    pub ready_poll_interval: Duration,
    /// Pause before `tts stop` so queued audio can drain on the device.
    pub empty_response_pause: Duration,
    /// Slack added to an utterance's duration when bounding its stream.
    pub utterance_grace: Duration,
    pub segment_queue_capacity: usize,
    pub turn_queue_capacity: usize,
    pub transmit_queue_capacity: usize,
    /// Frames sent back-to-back before pacing starts.
    pub burst_frames: usize,
    pub mcp_inbound_capacity: usize,
    /// Deadline for a single WebSocket write.
    pub write_timeout: Duration,
    /// Connection is dropped after this long without inbound traffic.
    pub idle_timeout: Duration,
    /// Delay between a disconnect and marking the device offline.
    pub offline_grace: Duration,
    pub max_tool_rounds: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(180),
            mcp_request_timeout: Duration::from_secs(30),
            ready_poll_interval: Duration::from_millis(100),
            empty_response_pause: Duration::from_millis(500),
            utterance_grace: Duration::from_secs(5),
            segment_queue_capacity: 100,
            turn_queue_capacity: 100,
            transmit_queue_capacity: 15,
            burst_frames: 3,
            mcp_inbound_capacity: 100,
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            offline_grace: Duration::from_secs(5),
            max_tool_rounds: 5,
        }
    }
}

/// Endpoints and models of the OpenAI-compatible collaborator backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub stt_base_url: String,
    pub stt_model: String,
    pub stt_language: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub tts_base_url: String,
    pub tts_model: String,
    pub tts_voice: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            stt_base_url: DEFAULT_STT_BASE_URL.to_string(),
            stt_model: "whisper-large-v3".to_string(),
            stt_language: Some("vi".to_string()),
            llm_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            tts_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            tts_model: "gpt-4o-mini-tts".to_string(),
            tts_voice: "alloy".to_string(),
        }
    }
}

/// Which devices may connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionSettings {
    /// MAC addresses bound at startup.
    pub devices: Vec<String>,
    /// Bind unknown devices on first contact.
    pub allow_unknown_devices: bool,
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("{key} must be a number, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be true or false, got '{value}'")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Everything the hub reads from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub hub: HubSettings,
    pub providers: ProviderSettings,
    pub admission: AdmissionSettings,
}

impl EnvConfig {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);
        let mut hub = HubSettings::default();

        env.secs("VOXHUB_LLM_TIMEOUT_SECS", &mut hub.llm_timeout)?;
        env.secs("VOXHUB_MCP_REQUEST_TIMEOUT_SECS", &mut hub.mcp_request_timeout)?;
        env.millis("VOXHUB_READY_POLL_MS", &mut hub.ready_poll_interval)?;
        env.millis(
            "VOXHUB_EMPTY_RESPONSE_PAUSE_MS",
            &mut hub.empty_response_pause,
        )?;
        env.count("VOXHUB_SEGMENT_QUEUE", &mut hub.segment_queue_capacity)?;
        env.count("VOXHUB_TURN_QUEUE", &mut hub.turn_queue_capacity)?;
        env.count("VOXHUB_TRANSMIT_QUEUE", &mut hub.transmit_queue_capacity)?;
        env.count("VOXHUB_BURST_FRAMES", &mut hub.burst_frames)?;
        env.count("VOXHUB_MCP_INBOUND_QUEUE", &mut hub.mcp_inbound_capacity)?;
        env.secs("VOXHUB_WRITE_TIMEOUT_SECS", &mut hub.write_timeout)?;
        env.secs("VOXHUB_IDLE_TIMEOUT_SECS", &mut hub.idle_timeout)?;
        env.secs("VOXHUB_OFFLINE_GRACE_SECS", &mut hub.offline_grace)?;
        env.count("VOXHUB_MAX_TOOL_ROUNDS", &mut hub.max_tool_rounds)?;

        let mut providers = ProviderSettings {
            api_key: env.string("OPENAI_API_KEY"),
            ..ProviderSettings::default()
        };
        env.replace("VOXHUB_STT_BASE_URL", &mut providers.stt_base_url);
        env.replace("VOXHUB_STT_MODEL", &mut providers.stt_model);
        if let Some(language) = lookup("VOXHUB_STT_LANGUAGE") {
            let language = language.trim().to_string();
            providers.stt_language = (!language.is_empty()).then_some(language);
        }
        env.replace("VOXHUB_LLM_BASE_URL", &mut providers.llm_base_url);
        env.replace("VOXHUB_LLM_MODEL", &mut providers.llm_model);
        env.replace("VOXHUB_TTS_BASE_URL", &mut providers.tts_base_url);
        env.replace("VOXHUB_TTS_MODEL", &mut providers.tts_model);
        env.replace("VOXHUB_TTS_VOICE", &mut providers.tts_voice);

        let admission = AdmissionSettings {
            devices: env
                .string("VOXHUB_DEVICES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|mac| !mac.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            allow_unknown_devices: env.flag("VOXHUB_ALLOW_UNKNOWN_DEVICES")?,
        };

        let config = Self {
            hub,
            providers,
            admission,
        };
        config.hub.validate()?;
        Ok(config)
    }
}

impl HubSettings {
    /// Reject values that would stall the engine.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let checks = [
            ("VOXHUB_LLM_TIMEOUT_SECS", self.llm_timeout.is_zero()),
            (
                "VOXHUB_MCP_REQUEST_TIMEOUT_SECS",
                self.mcp_request_timeout.is_zero(),
            ),
            ("VOXHUB_READY_POLL_MS", self.ready_poll_interval.is_zero()),
            ("VOXHUB_SEGMENT_QUEUE", self.segment_queue_capacity == 0),
            ("VOXHUB_TURN_QUEUE", self.turn_queue_capacity == 0),
            ("VOXHUB_TRANSMIT_QUEUE", self.transmit_queue_capacity == 0),
            ("VOXHUB_MCP_INBOUND_QUEUE", self.mcp_inbound_capacity == 0),
            ("VOXHUB_WRITE_TIMEOUT_SECS", self.write_timeout.is_zero()),
            ("VOXHUB_IDLE_TIMEOUT_SECS", self.idle_timeout.is_zero()),
        ];
        match checks.into_iter().find(|(_, is_zero)| *is_zero) {
            Some((key, _)) => Err(SettingsError::Zero { key }),
            None => Ok(()),
        }
    }
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn replace(&self, key: &str, target: &mut String) {
        if let Some(value) = self.string(key) {
            *target = value;
        }
    }

    fn number(&self, key: &'static str) -> Result<Option<u64>, SettingsError> {
        self.string(key)
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| SettingsError::InvalidNumber { key, value })
            })
            .transpose()
    }

    fn secs(&self, key: &'static str, target: &mut Duration) -> Result<(), SettingsError> {
        if let Some(n) = self.number(key)? {
            *target = Duration::from_secs(n);
        }
        Ok(())
    }

    fn millis(&self, key: &'static str, target: &mut Duration) -> Result<(), SettingsError> {
        if let Some(n) = self.number(key)? {
            *target = Duration::from_millis(n);
        }
        Ok(())
    }

    fn count(&self, key: &'static str, target: &mut usize) -> Result<(), SettingsError> {
        if let Some(n) = self.number(key)? {
            *target = usize::try_from(n).map_err(|_| SettingsError::InvalidNumber {
                key,
                value: n.to_string(),
            })?;
        }
        Ok(())
    }

    fn flag(&self, key: &'static str) -> Result<bool, SettingsError> {
        match self.string(key).as_deref().map(str::to_ascii_lowercase) {
            None => Ok(false),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(SettingsError::InvalidBool { key, value }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<EnvConfig, SettingsError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        EnvConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.hub, HubSettings::default());
        assert_eq!(config.hub.mcp_request_timeout, Duration::from_secs(30));
        assert_eq!(config.hub.llm_timeout, Duration::from_secs(180));
        assert_eq!(config.providers.stt_base_url, DEFAULT_STT_BASE_URL);
        assert!(config.admission.devices.is_empty());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            ("VOXHUB_MCP_REQUEST_TIMEOUT_SECS", "5"),
            ("VOXHUB_READY_POLL_MS", "20"),
            ("VOXHUB_DEVICES", "aa:bb, cc:dd ,"),
            ("VOXHUB_ALLOW_UNKNOWN_DEVICES", "yes"),
            ("VOXHUB_STT_LANGUAGE", ""),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.hub.mcp_request_timeout, Duration::from_secs(5));
        assert_eq!(config.hub.ready_poll_interval, Duration::from_millis(20));
        assert_eq!(config.admission.devices, vec!["aa:bb", "cc:dd"]);
        assert!(config.admission.allow_unknown_devices);
        assert_eq!(config.providers.stt_language, None);
        assert_eq!(config.providers.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn invalid_number_is_rejected() {
        let err = config(&[("VOXHUB_TURN_QUEUE", "many")]).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidNumber {
                key: "VOXHUB_TURN_QUEUE",
                ..
            }
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = config(&[("VOXHUB_TRANSMIT_QUEUE", "0")]).unwrap_err();
        assert!(matches!(err, SettingsError::Zero { .. }));
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let err = config(&[("VOXHUB_ALLOW_UNKNOWN_DEVICES", "maybe")]).unwrap_err();
        assert!(matches!(err, SettingsError::InvalidBool { .. }));
    }
}
