//! Voice activity segmenter.
//!
//! Decoded samples accumulate in a [`CircularBuffer`]; every full window is
//! handed to the detector and consumed, and completed speech segments are
//! drained from the detector queue in emission order.

use crate::ring::{CircularBuffer, DEFAULT_CAPACITY};
use crate::vad::{SpeechDetector, SpeechSegment};

/// Samples per detector window (32 ms at 16 kHz).
pub const VAD_WINDOW: usize = 512;

pub struct Segmenter {
    buffer: CircularBuffer,
    detector: Box<dyn SpeechDetector>,
    window: usize,
}

impl Segmenter {
    #[must_use]
    pub fn new(detector: Box<dyn SpeechDetector>) -> Self {
        Self::with_capacity(detector, DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(detector: Box<dyn SpeechDetector>, capacity: usize) -> Self {
        Self {
            buffer: CircularBuffer::new(capacity.max(VAD_WINDOW)),
            detector,
            window: VAD_WINDOW,
        }
    }

    /// Feed decoded samples; returns segments completed by this call.
    pub fn push(&mut self, samples: &[f32]) -> Vec<SpeechSegment> {
        let dropped = self.buffer.push(samples);
        if dropped > 0 {
            tracing::warn!(dropped, "PCM ring buffer overflow, oldest samples discarded");
        }

        let mut completed = Vec::new();
        while self.buffer.len() >= self.window {
            if let Some(window) = self.buffer.get(0, self.window) {
                self.detector.accept_waveform(&window);
            }
            self.buffer.pop(self.window);
            self.drain_into(&mut completed);
        }
        completed
    }

    /// Close any in-progress speech and return what completes.
    pub fn flush(&mut self) -> Vec<SpeechSegment> {
        self.detector.flush();
        let mut completed = Vec::new();
        self.drain_into(&mut completed);
        completed
    }

    /// Forget all buffered audio and acoustic state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.detector.clear();
    }

    /// Samples waiting for a full window.
    #[must_use]
    pub const fn pending_samples(&self) -> usize {
        self.buffer.len()
    }

    fn drain_into(&mut self, out: &mut Vec<SpeechSegment>) {
        while !self.detector.is_empty() {
            if let Some(segment) = self.detector.front() {
                out.push(segment);
            }
            self.detector.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vad::{EnergyDetector, VadConfig};

    fn energy_segmenter() -> Segmenter {
        Segmenter::new(Box::new(EnergyDetector::new(VadConfig::default(), 16_000)))
    }

    fn silence(ms: usize) -> Vec<f32> {
        vec![0.0; ms * 16]
    }

    fn tone(ms: usize) -> Vec<f32> {
        (0..ms * 16)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / 16_000.0;
                0.4 * (t * 300.0 * std::f32::consts::TAU).sin()
            })
            .collect()
    }

    #[test]
    fn k_regions_yield_k_segments_in_order() {
        let mut segmenter = energy_segmenter();
        let mut stream = silence(1000);
        for _ in 0..3 {
            stream.extend(tone(600));
            stream.extend(silence(1000));
        }

        // Feed in uneven slices to exercise partial windows.
        let mut segments = Vec::new();
        for chunk in stream.chunks(777) {
            segments.extend(segmenter.push(chunk));
        }

        assert_eq!(segments.len(), 3);
        assert!(segments.windows(2).all(|w| w[0].start < w[1].start));
        assert!(segments.iter().all(|s| s.sample_rate == 16_000));
    }

    #[test]
    fn partial_window_waits() {
        let mut segmenter = energy_segmenter();
        assert!(segmenter.push(&silence(10)).is_empty());
        assert_eq!(segmenter.pending_samples(), 160);
        segmenter.push(&silence(30));
        assert_eq!(segmenter.pending_samples(), 640 - VAD_WINDOW);
    }

    #[test]
    fn flush_emits_trailing_speech() {
        let mut segmenter = energy_segmenter();
        segmenter.push(&silence(500));
        assert!(segmenter.push(&tone(800)).is_empty());
        assert_eq!(segmenter.flush().len(), 1);
    }

    #[test]
    fn reset_forgets_open_speech() {
        let mut segmenter = energy_segmenter();
        segmenter.push(&tone(800));
        segmenter.reset();
        assert_eq!(segmenter.pending_samples(), 0);
        assert!(segmenter.push(&silence(1000)).is_empty());
    }
}
