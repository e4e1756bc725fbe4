//! Voice activity detection.
//!
//! A [`SpeechDetector`] is fed fixed-size windows and queues every speech
//! region it has seen bounded by silence on both sides. The queue is drained
//! with `is_empty` / `front` / `pop`.
//!
//! Two detectors are available:
//!
//! * [`EnergyDetector`]: RMS energy thresholding. Always available.
//! * `SileroDetector` (`sherpa` feature): Silero VAD via
//!   `sherpa_rs::silero_vad::SileroVad`. Far fewer false positives on noise.

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::VoiceError;

/// VAD configuration parameters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VadConfig {
    /// Speech detection threshold (0.0–1.0, default 0.5).
    ///
    /// Higher values require more confidence before speech is detected.
    pub threshold: f32,

    /// Continuous silence (ms) that ends a speech region (default 700).
    pub min_silence_duration_ms: u32,

    /// Shortest speech region (ms) that is kept (default 250).
    pub min_speech_duration_ms: u32,

    /// Audio (ms) kept before detected speech onset (default 200).
    pub speech_pad_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_duration_ms: 700,
            min_speech_duration_ms: 250,
            speech_pad_ms: 200,
        }
    }
}

/// A bounded region of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Offset of the first sample in the detector's input stream.
    pub start: usize,
}

impl SpeechSegment {
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Acoustic state machine that turns windows into queued speech segments.
pub trait SpeechDetector: Send {
    /// Feed one window of mono samples.
    fn accept_waveform(&mut self, window: &[f32]);

    /// Whether no completed segment is queued.
    fn is_empty(&mut self) -> bool;

    /// The oldest completed segment, if any.
    fn front(&mut self) -> Option<SpeechSegment>;

    /// Discard the oldest completed segment.
    fn pop(&mut self);

    /// Close any in-progress region as a segment.
    fn flush(&mut self);

    /// Drop all acoustic state and queued segments.
    fn clear(&mut self);
}

// ── Energy-based detector ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnergyState {
    Silence,
    /// Loud windows seen, not yet long enough to count as speech.
    Onset,
    Speech,
}

/// RMS energy thresholding detector.
pub struct EnergyDetector {
    config: VadConfig,
    sample_rate: u32,
    state: EnergyState,
    threshold: f32,
    /// Recent quiet audio prepended to a new region.
    preroll: VecDeque<f32>,
    current: Vec<f32>,
    current_start: usize,
    speech_samples: usize,
    silence_samples: usize,
    /// Samples accepted since creation or the last clear.
    position: usize,
    queue: VecDeque<SpeechSegment>,
}

impl EnergyDetector {
    #[must_use]
    pub fn new(config: VadConfig, sample_rate: u32) -> Self {
        let threshold = energy_threshold_from_vad_threshold(config.threshold);
        Self {
            config,
            sample_rate,
            state: EnergyState::Silence,
            threshold,
            preroll: VecDeque::new(),
            current: Vec::new(),
            current_start: 0,
            speech_samples: 0,
            silence_samples: 0,
            position: 0,
            queue: VecDeque::new(),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn ms_to_samples(&self, ms: u32) -> usize {
        (u64::from(ms) * u64::from(self.sample_rate) / 1000) as usize
    }

    fn begin_region(&mut self, window: &[f32]) {
        self.current_start = self.position - self.preroll.len();
        self.current.clear();
        self.current.extend(self.preroll.drain(..));
        self.current.extend_from_slice(window);
        self.speech_samples = window.len();
        self.silence_samples = 0;
    }

    fn finish_region(&mut self) {
        let samples = std::mem::take(&mut self.current);
        tracing::debug!(
            samples = samples.len(),
            start = self.current_start,
            "VAD: speech segment complete"
        );
        self.queue.push_back(SpeechSegment {
            samples,
            sample_rate: self.sample_rate,
            start: self.current_start,
        });
        self.state = EnergyState::Silence;
        self.speech_samples = 0;
        self.silence_samples = 0;
    }

    fn remember_quiet(&mut self, window: &[f32]) {
        let keep = self.ms_to_samples(self.config.speech_pad_ms);
        self.preroll.extend(window.iter().copied());
        let excess = self.preroll.len().saturating_sub(keep);
        self.preroll.drain(..excess);
    }
}

impl SpeechDetector for EnergyDetector {
    fn accept_waveform(&mut self, window: &[f32]) {
        let is_speech = calculate_rms_energy(window) > self.threshold;

        match self.state {
            EnergyState::Silence => {
                if is_speech {
                    self.begin_region(window);
                    self.state = EnergyState::Onset;
                } else {
                    self.remember_quiet(window);
                }
            }
            EnergyState::Onset => {
                self.current.extend_from_slice(window);
                if is_speech {
                    self.speech_samples += window.len();
                    if self.speech_samples >= self.ms_to_samples(self.config.min_speech_duration_ms)
                    {
                        self.state = EnergyState::Speech;
                    }
                } else {
                    // Too short to be speech; a click or pop.
                    self.current.clear();
                    self.speech_samples = 0;
                    self.state = EnergyState::Silence;
                    self.remember_quiet(window);
                }
            }
            EnergyState::Speech => {
                self.current.extend_from_slice(window);
                if is_speech {
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += window.len();
                    if self.silence_samples
                        >= self.ms_to_samples(self.config.min_silence_duration_ms)
                    {
                        self.finish_region();
                    }
                }
            }
        }

        self.position += window.len();
    }

    fn is_empty(&mut self) -> bool {
        self.queue.is_empty()
    }

    fn front(&mut self) -> Option<SpeechSegment> {
        self.queue.front().cloned()
    }

    fn pop(&mut self) {
        self.queue.pop_front();
    }

    fn flush(&mut self) {
        if self.state == EnergyState::Speech && !self.current.is_empty() {
            self.finish_region();
        }
    }

    fn clear(&mut self) {
        self.state = EnergyState::Silence;
        self.preroll.clear();
        self.current.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
        self.position = 0;
        self.queue.clear();
    }
}

/// Calculate RMS (Root Mean Square) energy of an audio window.
#[must_use]
pub fn calculate_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();

    #[allow(clippy::cast_precision_loss)]
    let mean = sum_squares / samples.len() as f32;

    mean.sqrt()
}

/// Map VAD threshold (0.0–1.0) to an RMS energy threshold in `[0.001, 0.05]`.
fn energy_threshold_from_vad_threshold(vad_threshold: f32) -> f32 {
    let min_energy: f32 = 0.001;
    let max_energy: f32 = 0.05;
    (max_energy - min_energy).mul_add(vad_threshold, min_energy)
}

// ── Silero detector ────────────────────────────────────────────────────────

#[cfg(feature = "sherpa")]
pub use silero::SileroDetector;

#[cfg(feature = "sherpa")]
mod silero {
    use std::path::Path;

    use sherpa_rs::silero_vad::{SileroVad, SileroVadConfig};

    use super::{SpeechDetector, SpeechSegment, VadConfig};
    use crate::error::VoiceError;

    /// Seconds of speech Silero may buffer internally.
    const BUFFER_SECS: f32 = 5.0;

    pub struct SileroDetector {
        inner: SileroVad,
        sample_rate: u32,
    }

    impl SileroDetector {
        /// Load a `silero_vad.onnx` model.
        pub fn load(
            model_path: &Path,
            config: &VadConfig,
            sample_rate: u32,
        ) -> Result<Self, VoiceError> {
            if !model_path.exists() {
                return Err(VoiceError::VadModel(format!(
                    "{} does not exist",
                    model_path.display()
                )));
            }
            let model = model_path
                .to_str()
                .ok_or_else(|| VoiceError::VadModel(model_path.display().to_string()))?;

            let silero_config = SileroVadConfig {
                model: model.to_string(),
                threshold: config.threshold,
                #[allow(clippy::cast_precision_loss)]
                min_silence_duration: config.min_silence_duration_ms as f32 / 1000.0,
                #[allow(clippy::cast_precision_loss)]
                min_speech_duration: config.min_speech_duration_ms as f32 / 1000.0,
                sample_rate,
                ..SileroVadConfig::default()
            };

            let inner = SileroVad::new(silero_config, BUFFER_SECS)
                .map_err(|e| VoiceError::VadModel(e.to_string()))?;
            tracing::info!(path = %model_path.display(), "Silero VAD model loaded");
            Ok(Self { inner, sample_rate })
        }
    }

    impl SpeechDetector for SileroDetector {
        fn accept_waveform(&mut self, window: &[f32]) {
            self.inner.accept_waveform(window.to_vec());
        }

        fn is_empty(&mut self) -> bool {
            self.inner.is_empty()
        }

        fn front(&mut self) -> Option<SpeechSegment> {
            if self.inner.is_empty() {
                return None;
            }
            let segment = self.inner.front();
            Some(SpeechSegment {
                samples: segment.samples,
                sample_rate: self.sample_rate,
                start: usize::try_from(segment.start).unwrap_or(0),
            })
        }

        fn pop(&mut self) {
            self.inner.pop();
        }

        fn flush(&mut self) {
            self.inner.flush();
        }

        fn clear(&mut self) {
            self.inner.clear();
        }
    }
}

/// Build the configured detector: Silero when a model path is given and the
/// `sherpa` feature is enabled, energy otherwise.
pub fn build_detector(
    config: VadConfig,
    sample_rate: u32,
    model_path: Option<&std::path::Path>,
) -> Result<Box<dyn SpeechDetector>, VoiceError> {
    match model_path {
        #[cfg(feature = "sherpa")]
        Some(path) => Ok(Box::new(SileroDetector::load(path, &config, sample_rate)?)),
        #[cfg(not(feature = "sherpa"))]
        Some(path) => {
            tracing::warn!(
                path = %path.display(),
                "Silero VAD requested but the sherpa feature is disabled; using energy VAD"
            );
            Ok(Box::new(EnergyDetector::new(config, sample_rate)))
        }
        None => Ok(Box::new(EnergyDetector::new(config, sample_rate))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: usize = 512;

    fn quiet() -> Vec<f32> {
        vec![0.0; WINDOW]
    }

    fn loud() -> Vec<f32> {
        (0..WINDOW)
            .map(|i| if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect()
    }

    fn feed(detector: &mut EnergyDetector, window: &[f32], count: usize) {
        for _ in 0..count {
            detector.accept_waveform(window);
        }
    }

    #[test]
    fn model_path_selects_detector() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("silero_vad.onnx");

        #[cfg(feature = "sherpa")]
        assert!(matches!(
            build_detector(VadConfig::default(), 16_000, Some(&model)),
            Err(VoiceError::VadModel(_))
        ));

        #[cfg(not(feature = "sherpa"))]
        {
            std::fs::write(&model, b"onnx").unwrap();
            let mut detector =
                build_detector(VadConfig::default(), 16_000, Some(&model)).unwrap();
            detector.accept_waveform(&loud());
            assert!(detector.is_empty());
        }
    }

    #[test]
    fn rms_energy() {
        assert!(calculate_rms_energy(&[]).abs() < f32::EPSILON);
        assert!((calculate_rms_energy(&loud()) - 0.3).abs() < 1e-4);
    }

    #[test]
    fn speech_bounded_by_silence_yields_one_segment() {
        let mut detector = EnergyDetector::new(VadConfig::default(), 16_000);
        feed(&mut detector, &quiet(), 20);
        feed(&mut detector, &loud(), 20);
        assert!(detector.is_empty());
        // 700 ms of silence = 22 windows of 32 ms.
        feed(&mut detector, &quiet(), 25);

        let segment = detector.front().unwrap();
        detector.pop();
        assert!(detector.is_empty());
        assert!(segment.samples.len() >= 20 * WINDOW);
        assert!(segment.start < 20 * WINDOW);
    }

    #[test]
    fn clicks_are_ignored() {
        let mut detector = EnergyDetector::new(VadConfig::default(), 16_000);
        for _ in 0..10 {
            feed(&mut detector, &loud(), 1);
            feed(&mut detector, &quiet(), 30);
        }
        assert!(detector.is_empty());
    }

    #[test]
    fn flush_closes_open_region() {
        let mut detector = EnergyDetector::new(VadConfig::default(), 16_000);
        feed(&mut detector, &loud(), 20);
        assert!(detector.is_empty());
        detector.flush();
        assert!(!detector.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut detector = EnergyDetector::new(VadConfig::default(), 16_000);
        feed(&mut detector, &loud(), 20);
        feed(&mut detector, &quiet(), 25);
        feed(&mut detector, &loud(), 5);
        detector.clear();
        assert!(detector.is_empty());
        detector.flush();
        assert!(detector.is_empty());
    }

    #[test]
    fn segment_duration() {
        let segment = SpeechSegment {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
            start: 0,
        };
        assert_eq!(segment.duration(), Duration::from_millis(500));
    }
}
