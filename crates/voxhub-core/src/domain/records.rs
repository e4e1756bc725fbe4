//! Plain records exchanged with the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binding status of a device in the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Bound,
    Unbound,
}

/// A device known to the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub mac_address: String,
    pub status: DeviceStatus,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    #[must_use]
    pub fn bound(id: impl Into<String>, mac_address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mac_address: mac_address.into(),
            status: DeviceStatus::Bound,
            agent_id: None,
            online: false,
            last_seen: None,
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.status == DeviceStatus::Bound
    }
}

/// Author of a persisted history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
}

impl HistoryRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One persisted conversation line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub role: HistoryRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Per-agent behaviour configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub system_prompt: String,
    pub llm_model: Option<String>,
    pub tts_voice: Option<String>,
    /// Inputs answered with a wake word instead of a model call.
    pub wake_words: Vec<String>,
    /// Flat `[trigger, reply, trigger, reply, ...]` pairs.
    pub quick_replies: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt:
                "You are a helpful voice assistant. Answer briefly, one sentence per line. \
                 Use the appropriate tool based on user intent."
                    .to_string(),
            llm_model: None,
            tts_voice: None,
            wake_words: Vec::new(),
            quick_replies: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Look up a quick reply for `input` (case-insensitive, trimmed).
    #[must_use]
    pub fn quick_reply(&self, input: &str) -> Option<&str> {
        let needle = input.trim();
        self.quick_replies
            .chunks_exact(2)
            .find(|pair| pair[0].trim().eq_ignore_ascii_case(needle))
            .map(|pair| pair[1].as_str())
    }

    /// Whether `input` is one of the configured wake words.
    #[must_use]
    pub fn is_wake_word(&self, input: &str) -> bool {
        let needle = input.trim();
        self.wake_words
            .iter()
            .any(|w| w.trim().eq_ignore_ascii_case(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_reply_pairs() {
        let config = AgentConfig {
            quick_replies: vec![
                "hi".into(),
                "Hello! How can I assist you today?".into(),
                "dangling".into(),
            ],
            ..AgentConfig::default()
        };
        assert_eq!(
            config.quick_reply(" HI "),
            Some("Hello! How can I assist you today?")
        );
        assert_eq!(config.quick_reply("dangling"), None);
    }

    #[test]
    fn wake_words_are_case_insensitive() {
        let config = AgentConfig {
            wake_words: vec!["Hey Zhi".into()],
            ..AgentConfig::default()
        };
        assert!(config.is_wake_word("hey zhi"));
        assert!(!config.is_wake_word("hey"));
    }
}
