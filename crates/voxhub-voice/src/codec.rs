//! Opus frame codec.
//!
//! Both directions work on single 60 ms frames of 16 kHz mono audio. A codec
//! instance carries inter-frame state, so each stream owns its own and never
//! shares it.

use opus::{Application, Channels, Decoder, Encoder};
use voxhub_core::{DEVICE_SAMPLE_RATE, SAMPLES_PER_FRAME};

use crate::error::VoiceError;
use crate::pool;

/// Largest frame a device may send (120 ms at 16 kHz).
const MAX_DECODED_SAMPLES: usize = SAMPLES_PER_FRAME * 2;

/// Decodes device frames to mono float samples.
pub struct FrameDecoder {
    inner: Decoder,
    scratch: Vec<f32>,
}

impl FrameDecoder {
    pub fn new() -> Result<Self, VoiceError> {
        let inner = Decoder::new(DEVICE_SAMPLE_RATE, Channels::Mono)
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
        Ok(Self {
            inner,
            scratch: vec![0.0; MAX_DECODED_SAMPLES],
        })
    }

    /// Decode one packet. The returned slice is valid until the next call.
    ///
    /// A zero-length result is not an error; callers log and move on.
    pub fn decode(&mut self, packet: &[u8]) -> Result<&[f32], VoiceError> {
        if packet.is_empty() {
            return Err(VoiceError::Decode("empty packet".to_string()));
        }
        let samples = self
            .inner
            .decode_float(packet, &mut self.scratch, false)
            .map_err(|e| VoiceError::Decode(e.to_string()))?;
        Ok(&self.scratch[..samples])
    }
}

/// Encodes exactly one frame of 16-bit PCM at a time.
pub struct FrameEncoder {
    inner: Encoder,
}

impl FrameEncoder {
    pub fn new() -> Result<Self, VoiceError> {
        let inner = Encoder::new(DEVICE_SAMPLE_RATE, Channels::Mono, Application::Voip)
            .map_err(|e| VoiceError::Codec(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encode `pcm` into `out`, returning the packet length.
    ///
    /// A short trailing frame is zero-padded to [`SAMPLES_PER_FRAME`].
    pub fn encode(&mut self, pcm: &[i16], out: &mut [u8]) -> Result<usize, VoiceError> {
        match pcm.len() {
            SAMPLES_PER_FRAME => self
                .inner
                .encode(pcm, out)
                .map_err(|e| VoiceError::Encode(e.to_string())),
            n if n < SAMPLES_PER_FRAME => {
                let mut padded = pool::global().pcm.checkout();
                padded[..n].copy_from_slice(pcm);
                self.inner
                    .encode(&padded, out)
                    .map_err(|e| VoiceError::Encode(e.to_string()))
            }
            n => Err(VoiceError::Encode(format!(
                "frame has {n} samples, expected at most {SAMPLES_PER_FRAME}"
            ))),
        }
    }
}
