//! Speech recognition dispatcher.
//!
//! Owns the capture path of one session: opus frames are decoded, segmented
//! by the VAD, and completed segments are queued for a single recognition
//! worker.
//!
//! # Design Principles
//!
//! - **One worker**: segments are transcribed strictly one at a time in VAD
//!   emission order, which bounds memory and keeps transcripts ordered.
//! - **Best-effort intake**: when the segment queue is full the segment is
//!   dropped and counted ([`Recognizer::dropped_segments`]); decoding never
//!   waits on recognition.
//! - **Blocking handoff**: transcripts are sent to the turn orchestrator with
//!   a bounded `send().await`, so an overwhelmed orchestrator slows the worker
//!   rather than losing text.
//!
//! # Cancellation
//!
//! The worker runs on a child of the session token. [`Recognizer::stop`]
//! cancels it and closes the queue; session cancellation does the same.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use voxhub_core::SpeechToText;

use crate::codec::FrameDecoder;
use crate::error::VoiceError;
use crate::segmenter::Segmenter;
use crate::vad::{SpeechDetector, SpeechSegment};
use crate::wav::encode_wav;

/// Default capacity of the pending segment queue.
pub const DEFAULT_SEGMENT_QUEUE: usize = 100;

struct Worker {
    segments: mpsc::Sender<SpeechSegment>,
    cancel: CancellationToken,
}

pub struct Recognizer {
    decoder: FrameDecoder,
    segmenter: Segmenter,
    stt: Arc<dyn SpeechToText>,
    transcripts: mpsc::Sender<String>,
    tracker: TaskTracker,
    session_cancel: CancellationToken,
    queue_capacity: usize,
    worker: Option<Worker>,
    dropped: Arc<AtomicU64>,
}

impl Recognizer {
    /// Create a stopped recognizer.
    ///
    /// Workers are spawned on `tracker` and cancelled with `session_cancel`.
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        detector: Box<dyn SpeechDetector>,
        transcripts: mpsc::Sender<String>,
        tracker: TaskTracker,
        session_cancel: CancellationToken,
        queue_capacity: usize,
    ) -> Result<Self, VoiceError> {
        Ok(Self {
            decoder: FrameDecoder::new()?,
            segmenter: Segmenter::new(detector),
            stt,
            transcripts,
            tracker,
            session_cancel,
            queue_capacity: queue_capacity.max(1),
            worker: None,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Whether capture is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.cancel.is_cancelled())
    }

    /// Start capture. A no-op if already running; returns whether a worker was spawned.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        if self.session_cancel.is_cancelled() {
            tracing::debug!("Session cancelled, not starting capture");
            return false;
        }
        // Each capture is a new opus stream.
        match FrameDecoder::new() {
            Ok(decoder) => self.decoder = decoder,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create frame decoder");
                return false;
            }
        }

        let (segments_tx, segments_rx) = mpsc::channel(self.queue_capacity);
        let cancel = self.session_cancel.child_token();
        self.tracker.spawn(run_worker(
            segments_rx,
            Arc::clone(&self.stt),
            self.transcripts.clone(),
            cancel.clone(),
        ));
        self.worker = Some(Worker {
            segments: segments_tx,
            cancel,
        });
        tracing::debug!("Capture started");
        true
    }

    /// Stop capture and clear acoustic state. Safe to call repeatedly.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        worker.cancel.cancel();
        drop(worker.segments);
        self.segmenter.reset();
        tracing::debug!("Capture stopped");
        true
    }

    /// Feed one compressed frame.
    ///
    /// Returns the number of segments queued for recognition. Malformed
    /// frames are logged and skipped.
    pub fn write(&mut self, packet: &[u8]) -> Result<usize, VoiceError> {
        if !self.is_running() {
            return Err(VoiceError::NotActive);
        }

        let samples = match self.decoder.decode(packet) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, bytes = packet.len(), "Dropping undecodable frame");
                return Ok(0);
            }
        };
        if samples.is_empty() {
            tracing::warn!(bytes = packet.len(), "Frame decoded to zero samples");
            return Ok(0);
        }

        let segments = self.segmenter.push(samples);
        Ok(self.enqueue(segments))
    }

    /// Segments dropped because the queue was full.
    #[must_use]
    pub fn dropped_segments(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, segments: Vec<SpeechSegment>) -> usize {
        let Some(worker) = &self.worker else {
            return 0;
        };

        let mut queued = 0;
        for segment in segments {
            match worker.segments.try_send(segment) {
                Ok(()) => queued += 1,
                Err(mpsc::error::TrySendError::Full(segment)) => {
                    let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        duration_ms = segment.duration().as_millis(),
                        dropped_total = total,
                        "Speech queue full, dropping speech segment"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::warn!("Recognition worker gone, dropping speech segment");
                }
            }
        }
        queued
    }
}

impl Drop for Recognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_worker(
    mut segments: mpsc::Receiver<SpeechSegment>,
    stt: Arc<dyn SpeechToText>,
    transcripts: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        let segment = tokio::select! {
            () = cancel.cancelled() => break,
            next = segments.recv() => match next {
                Some(segment) => segment,
                None => break,
            },
        };

        let wav = match encode_wav(&segment.samples, segment.sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode speech segment");
                continue;
            }
        };

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = stt.transcribe(wav) => result,
        };

        let text = match result {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "Transcription failed");
                continue;
            }
        };
        if text.is_empty() {
            tracing::debug!("Empty transcript, ignoring segment");
            continue;
        }

        tracing::info!(text = %text, "Transcript");
        tokio::select! {
            () = cancel.cancelled() => break,
            sent = transcripts.send(text) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Recognition worker exited");
}
