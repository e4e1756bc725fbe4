//! Paced real-time audio transmission.
//!
//! Synthesized audio is converted to device PCM, cut into 60 ms frames,
//! encoded on a dedicated task and handed to the sender over a bounded
//! queue. The sender writes the first few frames back to back to prime the
//! device's playback buffer, then one frame per frame period.
//!
//! # Design Principles
//!
//! - **No silent loss**: the encoder waits on a full queue instead of
//!   dropping frames.
//! - **Scratch from the pool**: every packet buffer is a [`Pooled`] checkout
//!   and goes back when the frame is written or discarded.
//! - **Drain before done**: after the last frame the transmitter waits out
//!   the burst so the device has played everything before the caller moves on.
//!
//! # Cancellation
//!
//! The cancellation token is checked at every suspension point: queue
//! receive, pacing tick, frame write and the trailing drain. Cancellation
//! returns [`VoiceError::Cancelled`] and sends nothing further; the session
//! decides what to tell the device.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use voxhub_core::{FRAME_DURATION_MS, HubSettings, SAMPLES_PER_FRAME, SynthesizedAudio};

use crate::codec::FrameEncoder;
use crate::error::VoiceError;
use crate::pool::{self, Pooled};
use crate::resample::to_device_pcm;

/// Destination for encoded frames, usually the device connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, packet: &[u8]) -> Result<(), VoiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitConfig {
    /// Frames written immediately before pacing starts.
    pub burst_frames: usize,
    pub frame_duration: Duration,
    /// Encoded frames buffered between encoder and sender.
    pub queue_capacity: usize,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            burst_frames: 3,
            frame_duration: Duration::from_millis(u64::from(FRAME_DURATION_MS)),
            queue_capacity: 15,
        }
    }
}

impl TransmitConfig {
    #[must_use]
    pub fn from_settings(settings: &HubSettings) -> Self {
        Self {
            burst_frames: settings.burst_frames,
            queue_capacity: settings.transmit_queue_capacity,
            ..Self::default()
        }
    }

    /// Time spent after the last frame so the device can drain its buffer.
    #[must_use]
    pub fn drain_delay(&self) -> Duration {
        self.frame_duration
            .saturating_mul(u32::try_from(self.burst_frames).unwrap_or(u32::MAX))
    }
}

/// Totals for one transmitted artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub frames: usize,
    pub bytes: usize,
}

struct EncodedFrame {
    packet: Pooled<'static, u8>,
    len: usize,
}

impl EncodedFrame {
    fn bytes(&self) -> &[u8] {
        &self.packet[..self.len]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transmitter {
    config: TransmitConfig,
}

impl Transmitter {
    #[must_use]
    pub const fn new(config: TransmitConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &TransmitConfig {
        &self.config
    }

    /// Convert, encode and send one synthesized artifact.
    pub async fn transmit(
        &self,
        audio: &SynthesizedAudio,
        sink: &dyn FrameSink,
        cancel: &CancellationToken,
    ) -> Result<TransmitStats, VoiceError> {
        let pcm = to_device_pcm(audio)?;
        self.transmit_pcm(pcm, sink, cancel).await
    }

    /// Encode and send 16 kHz mono PCM.
    pub async fn transmit_pcm(
        &self,
        pcm: Vec<i16>,
        sink: &dyn FrameSink,
        cancel: &CancellationToken,
    ) -> Result<TransmitStats, VoiceError> {
        let mut stats = TransmitStats::default();
        if pcm.is_empty() {
            return Ok(stats);
        }

        let mut encoder = FrameEncoder::new()?;
        let (frames_tx, mut frames_rx) = mpsc::channel(self.config.queue_capacity.max(1));

        // Dropping the set aborts the encoder if we leave early.
        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            for (index, chunk) in pcm.chunks(SAMPLES_PER_FRAME).enumerate() {
                let mut packet = pool::global().packets.checkout();
                let len = match encoder.encode(chunk, &mut packet) {
                    Ok(len) => len,
                    Err(e) => {
                        tracing::warn!(index, error = %e, "Skipping frame that failed to encode");
                        continue;
                    }
                };
                if frames_tx.send(EncodedFrame { packet, len }).await.is_err() {
                    break;
                }
            }
        });

        let period = self.config.frame_duration;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return Err(VoiceError::Cancelled),
                next = frames_rx.recv() => next,
            };
            let Some(frame) = next else { break };

            if stats.frames >= self.config.burst_frames {
                tokio::select! {
                    () = cancel.cancelled() => return Err(VoiceError::Cancelled),
                    _ = ticker.tick() => {}
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(VoiceError::Cancelled),
                sent = sink.send_frame(frame.bytes()) => sent?,
            }
            stats.frames += 1;
            stats.bytes += frame.len;
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Frame encoder task failed");
            }
        }

        if stats.frames > 0 {
            tokio::select! {
                () = cancel.cancelled() => return Err(VoiceError::Cancelled),
                () = time::sleep(self.config.drain_delay()) => {}
            }
        }

        tracing::debug!(frames = stats.frames, bytes = stats.bytes, "Audio transmitted");
        Ok(stats)
    }
}
