#![doc = include_str!("../README.md")]
#![deny(unused_crate_dependencies)]

pub mod asr;
pub mod backend;
pub mod codec;
pub mod error;
pub mod pool;
pub mod resample;
pub mod ring;
pub mod segmenter;
pub mod session;
pub mod synthesis;
pub mod transmit;
pub mod vad;
pub mod wav;

// Re-export key types for convenience
pub use asr::Recognizer;
pub use backend::{OpenAiStt, OpenAiSttConfig, OpenAiTts, OpenAiTtsConfig};
pub use error::VoiceError;
pub use session::{CLOSE_NORMAL, DeviceLink, Session, SessionConfig, SessionDeps};
pub use synthesis::{SynthesisReport, synthesize_in_order};
pub use transmit::{FrameSink, TransmitConfig, TransmitStats, Transmitter};
pub use vad::{SpeechDetector, VadConfig, build_detector};
