//! Domain types shared by every voxhub crate.

pub mod audio;
pub mod records;
pub mod session;
pub mod turn;

pub use audio::{
    AudioParams, DEVICE_CHANNELS, DEVICE_SAMPLE_RATE, FRAME_DURATION_MS, OPUS_FORMAT,
    SAMPLES_PER_FRAME, SynthesizedAudio,
};
pub use records::{AgentConfig, DeviceRecord, DeviceStatus, HistoryEntry, HistoryRole};
pub use session::{SessionEvent, SessionInfo, SessionState};
pub use turn::{Utterance, UtteranceStatus, split_response_lines};
