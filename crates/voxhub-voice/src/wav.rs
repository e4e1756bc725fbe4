//! WAV container encoding and decoding.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use voxhub_core::SynthesizedAudio;

use crate::error::VoiceError;
use crate::resample::f32_to_i16;

const HEADER_LEN: usize = 44;

/// Wrap mono float samples into a 16-bit PCM WAV file held in memory.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, VoiceError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(HEADER_LEN + samples.len() * 2));
    let mut writer =
        WavWriter::new(&mut cursor, spec).map_err(|e| VoiceError::Wav(e.to_string()))?;
    for &sample in samples {
        writer
            .write_sample(f32_to_i16(sample))
            .map_err(|e| VoiceError::Wav(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| VoiceError::Wav(e.to_string()))?;

    Ok(cursor.into_inner())
}

/// Whether `bytes` starts with a RIFF/WAVE header.
#[must_use]
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Read a 16-bit integer WAV file into a synthesized audio artifact.
pub fn decode_wav(bytes: &[u8]) -> Result<SynthesizedAudio, VoiceError> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| VoiceError::Wav(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(VoiceError::UnsupportedAudio(format!(
            "{}-bit {:?} WAV",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| VoiceError::Wav(e.to_string()))?;

    Ok(SynthesizedAudio::from_samples(
        &samples,
        spec.sample_rate,
        spec.channels,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_segment_has_riff_header_and_payload() {
        let wav = encode_wav(&[0.0; 1600], 16_000).unwrap();
        assert!(is_wav(&wav));
        assert_eq!(wav.len(), HEADER_LEN + 1600 * 2);
    }

    #[test]
    fn decode_reads_back_format() {
        let wav = encode_wav(&[0.5, -0.5, 0.25], 24_000).unwrap();
        let audio = decode_wav(&wav).unwrap();
        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.frame_count(), 3);
    }

    #[test]
    fn raw_pcm_is_not_wav() {
        assert!(!is_wav(&[0u8; 64]));
        assert!(decode_wav(&[0u8; 64]).is_err());
    }
}
