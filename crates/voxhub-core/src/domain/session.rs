//! Session identity and turn state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation state of one connected device.
///
/// ```text
/// Idle ──► Listening ──► Processing ──► Speaking ──► Idle
///   │          │              │             │
///   └──────────┴──────────────┴─────────────┴──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Connected, nothing in flight.
    #[default]
    Idle,
    /// Capture is running and feeding the segmenter.
    Listening,
    /// A turn is waiting on the chat model.
    Processing,
    /// Synthesized speech is being streamed to the device.
    Speaking,
    /// Session torn down. Terminal.
    Closed,
}

/// Inputs that move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    CaptureStarted,
    TurnQueued,
    /// The turn worker took the next turn off the queue.
    TurnStarted,
    ModelAnswered,
    ModelAbandoned,
    SpeechFinished,
    Close,
}

impl SessionState {
    /// Apply an event, returning the next state.
    ///
    /// Events that do not apply in the current state leave it unchanged.
    #[must_use]
    pub const fn apply(self, event: SessionEvent) -> Self {
        use SessionEvent as E;
        match (self, event) {
            (Self::Closed, _) => Self::Closed,
            (_, E::Close) => Self::Closed,
            (Self::Idle, E::CaptureStarted) => Self::Listening,
            // A turn queued while speaking waits for the current one.
            (Self::Speaking, E::TurnQueued) => Self::Speaking,
            (Self::Idle | Self::Listening | Self::Processing, E::TurnQueued) | (_, E::TurnStarted) => {
                Self::Processing
            }
            (Self::Processing, E::ModelAnswered) => Self::Speaking,
            (Self::Processing, E::ModelAbandoned) | (Self::Speaking, E::SpeechFinished) => {
                Self::Idle
            }
            (state, _) => state,
        }
    }

    /// Whether the session has been closed.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an admitted connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub device_id: String,
    pub client_id: String,
    pub protocol_version: String,
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        device_id: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            client_id: client_id.into(),
            protocol_version: "1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_turn_cycle() {
        let state = SessionState::Idle
            .apply(SessionEvent::CaptureStarted)
            .apply(SessionEvent::TurnQueued)
            .apply(SessionEvent::ModelAnswered);
        assert_eq!(state, SessionState::Speaking);
        assert_eq!(state.apply(SessionEvent::SpeechFinished), SessionState::Idle);
    }

    #[test]
    fn abandoned_model_call_returns_to_idle() {
        let state = SessionState::Processing.apply(SessionEvent::ModelAbandoned);
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn wake_text_skips_listening() {
        assert_eq!(
            SessionState::Idle.apply(SessionEvent::TurnQueued),
            SessionState::Processing
        );
    }

    #[test]
    fn queued_turn_runs_after_the_previous_one() {
        let state = SessionState::Idle
            .apply(SessionEvent::TurnQueued)
            .apply(SessionEvent::TurnQueued)
            .apply(SessionEvent::TurnStarted)
            .apply(SessionEvent::ModelAnswered)
            .apply(SessionEvent::SpeechFinished);
        assert_eq!(state, SessionState::Idle);

        let state = state.apply(SessionEvent::TurnStarted);
        assert_eq!(state, SessionState::Processing);
        assert_eq!(
            state.apply(SessionEvent::ModelAnswered),
            SessionState::Speaking
        );
    }

    #[test]
    fn closed_is_terminal() {
        for state in [
            SessionState::Idle,
            SessionState::Listening,
            SessionState::Processing,
            SessionState::Speaking,
        ] {
            let closed = state.apply(SessionEvent::Close);
            assert!(closed.is_closed());
            assert!(closed.apply(SessionEvent::CaptureStarted).is_closed());
            assert!(closed.apply(SessionEvent::TurnStarted).is_closed());
        }
    }

    #[test]
    fn unrelated_events_are_ignored() {
        assert_eq!(
            SessionState::Listening.apply(SessionEvent::SpeechFinished),
            SessionState::Listening
        );
    }
}
