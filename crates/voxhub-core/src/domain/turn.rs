//! Turn and utterance types.

use super::audio::SynthesizedAudio;

/// Lifecycle of one response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceStatus {
    Pending,
    Ready,
    Error,
}

/// One line of a turn's response and its synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub index: usize,
    pub text: String,
    pub audio: Option<SynthesizedAudio>,
    pub status: UtteranceStatus,
}

impl Utterance {
    #[must_use]
    pub const fn pending(index: usize, text: String) -> Self {
        Self {
            index,
            text,
            audio: None,
            status: UtteranceStatus::Pending,
        }
    }

    /// Mark ready with the synthesized artifact.
    #[must_use]
    pub fn ready(mut self, audio: SynthesizedAudio) -> Self {
        self.audio = Some(audio);
        self.status = UtteranceStatus::Ready;
        self
    }

    /// Mark failed; the line is skipped during delivery.
    #[must_use]
    pub fn failed(mut self) -> Self {
        self.audio = None;
        self.status = UtteranceStatus::Error;
        self
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == UtteranceStatus::Ready && self.audio.is_some()
    }
}

/// Split a model response into the non-empty, trimmed lines that get synthesized.
#[must_use]
pub fn split_response_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_dropped() {
        let lines = split_response_lines("Hello there.\n\n  \nHow can I help?\n");
        assert_eq!(lines, vec!["Hello there.", "How can I help?"]);
    }

    #[test]
    fn empty_response_has_no_lines() {
        assert!(split_response_lines("").is_empty());
        assert!(split_response_lines("\n \n").is_empty());
    }

    #[test]
    fn failed_utterance_is_not_ready() {
        let utterance = Utterance::pending(0, "hi".into())
            .ready(SynthesizedAudio::pcm16(vec![0; 4], 16_000, 1))
            .failed();
        assert!(!utterance.is_ready());
        assert_eq!(utterance.status, UtteranceStatus::Error);
    }
}
