//! Sample format conversion and resampling.
//!
//! Synthesis backends return interleaved 16-bit PCM at their own rate and
//! channel count. Devices only accept 16 kHz mono, so every artifact goes
//! through [`to_device_pcm`] before framing.

use rubato::{FftFixedIn, Resampler};
use voxhub_core::{DEVICE_SAMPLE_RATE, SynthesizedAudio};

use crate::error::VoiceError;

/// Input chunk size for the FFT resampler.
const CHUNK_SIZE: usize = 1024;

/// Convert a float sample in `[-1.0, 1.0]` to 16-bit, clamping overshoot.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

#[must_use]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

/// Decode interleaved little-endian 16-bit PCM and average channels to mono.
pub fn downmix_pcm16(content: &[u8], channels: u16) -> Result<Vec<f32>, VoiceError> {
    if channels == 0 {
        return Err(VoiceError::UnsupportedAudio("zero channels".to_string()));
    }
    let channels = usize::from(channels);
    let samples: Vec<f32> = content
        .chunks_exact(2)
        .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect();

    if channels == 1 {
        return Ok(samples);
    }

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / channels as f32;
    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * scale)
        .collect())
}

/// Resample mono audio between two rates.
///
/// The trailing partial chunk is zero-padded and the output trimmed to the
/// proportional length.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, VoiceError> {
    if samples.is_empty() || from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_SIZE,
        2, // sub-chunks for quality
        1, // mono
    )
    .map_err(|e| VoiceError::Resample(e.to_string()))?;

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).ceil() as usize;
    let chunk_size = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + chunk_size);
    let mut block = vec![0.0f32; chunk_size];
    let mut pos = 0;

    // Keep feeding (zeros once input runs out) until the delayed tail is flushed.
    while output.len() < expected + delay {
        let n = samples.len().saturating_sub(pos).min(chunk_size);
        block[..n].copy_from_slice(&samples[pos..pos + n]);
        block[n..].fill(0.0);
        pos += n;

        let result = resampler
            .process(&[block.as_slice()], None)
            .map_err(|e| VoiceError::Resample(e.to_string()))?;
        match result.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => return Err(VoiceError::Resample("resampler produced no output".into())),
        }
    }

    output.drain(..delay);
    output.truncate(expected);
    Ok(output)
}

/// Convert a synthesized artifact to 16 kHz mono 16-bit samples.
pub fn to_device_pcm(audio: &SynthesizedAudio) -> Result<Vec<i16>, VoiceError> {
    if audio.bit_depth != 16 {
        return Err(VoiceError::UnsupportedAudio(format!(
            "{}-bit PCM",
            audio.bit_depth
        )));
    }
    let mono = downmix_pcm16(&audio.content, audio.channels)?;
    let resampled = resample(&mono, audio.sample_rate, DEVICE_SAMPLE_RATE)?;
    Ok(resampled.into_iter().map(f32_to_i16).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_clamp() {
        assert_eq!(f32_to_i16(2.0), i16::MAX);
        assert_eq!(f32_to_i16(-2.0), -i16::MAX);
        assert!((i16_to_f32(i16::MAX) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stereo_is_averaged() {
        let content: Vec<u8> = [i16::MAX, 0, 0, i16::MAX]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mono = downmix_pcm16(&content, 2).unwrap();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-4);
        assert!((mono[1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn same_rate_is_passthrough() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16_000, 16_000).unwrap(), samples);
    }

    #[test]
    fn downsampling_scales_length() {
        let samples = vec![0.0f32; 24_000];
        let out = resample(&samples, 24_000, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn device_pcm_from_24k_synthesis() {
        let audio = SynthesizedAudio::from_samples(&vec![0i16; 2_400], 24_000, 1);
        let pcm = to_device_pcm(&audio).unwrap();
        assert_eq!(pcm.len(), 1_600);
    }

    #[test]
    fn non_16_bit_is_rejected() {
        let audio = SynthesizedAudio {
            content: vec![0; 12],
            sample_rate: 16_000,
            channels: 1,
            bit_depth: 24,
        };
        assert!(matches!(
            to_device_pcm(&audio),
            Err(VoiceError::UnsupportedAudio(_))
        ));
    }
}
