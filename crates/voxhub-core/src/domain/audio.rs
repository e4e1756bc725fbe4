//! Audio parameters and synthesized audio artifacts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Sample rate of every stream exchanged with a device.
pub const DEVICE_SAMPLE_RATE: u32 = 16_000;

/// Channel count of every stream exchanged with a device.
pub const DEVICE_CHANNELS: u16 = 1;

/// Duration of one codec frame in milliseconds.
pub const FRAME_DURATION_MS: u32 = 60;

/// Samples in one mono frame at [`DEVICE_SAMPLE_RATE`].
pub const SAMPLES_PER_FRAME: usize = 960;

/// The only compressed format the hub speaks.
pub const OPUS_FORMAT: &str = "opus";

/// Audio parameters negotiated in the `hello` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_duration: Option<u32>,
}

impl AudioParams {
    /// Parameters the server locks every session to.
    #[must_use]
    pub fn server_default() -> Self {
        Self {
            format: OPUS_FORMAT.to_string(),
            sample_rate: DEVICE_SAMPLE_RATE,
            channels: DEVICE_CHANNELS,
            frame_duration: Some(FRAME_DURATION_MS),
        }
    }

    /// Whether binary frames in this format can be fed to the decoder.
    #[must_use]
    pub fn is_opus(&self) -> bool {
        self.format.eq_ignore_ascii_case(OPUS_FORMAT)
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self::server_default()
    }
}

/// Raw PCM returned by a speech synthesis backend.
///
/// `content` is interleaved little-endian PCM at `bit_depth` bits per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub content: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl SynthesizedAudio {
    /// Wrap 16-bit little-endian PCM bytes.
    #[must_use]
    pub const fn pcm16(content: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            content,
            sample_rate,
            channels,
            bit_depth: 16,
        }
    }

    /// Build from 16-bit samples.
    #[must_use]
    pub fn from_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let content = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::pcm16(content, sample_rate, channels)
    }

    /// Number of sample frames (one sample per channel).
    #[must_use]
    pub fn frame_count(&self) -> usize {
        let bytes_per_frame = usize::from(self.bit_depth / 8) * usize::from(self.channels);
        if bytes_per_frame == 0 {
            return 0;
        }
        self.content.len() / bytes_per_frame
    }

    /// Playback duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = self.frame_count() as f64 / f64::from(self.sample_rate);
        Duration::from_secs_f64(secs)
    }

    /// Whether the artifact carries no audio.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
