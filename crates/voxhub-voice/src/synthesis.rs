//! Ordered-parallel speech synthesis.
//!
//! Every line of a response is synthesized concurrently, one task per line.
//! Results come back on a shared completion channel in whatever order the
//! backend finishes them; the delivery loop holds early finishers until
//! every lower index has been delivered or skipped, so the device always
//! hears lines in the order they were written.
//!
//! ```text
//! line 0 ──► tts ──────────────┐
//! line 1 ──► tts ──┐           │     slots: [ _, 1, _ ]  waiting for 0
//! line 2 ──► tts ──┼───────────┼──► completion channel ──► deliver 0, 1, 2
//!                  └───────────┘
//! ```
//!
//! A failed line is skipped without holding up the ones after it.
//! Outstanding synthesis tasks are aborted when the loop returns.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use voxhub_core::{SpeechSynthesizer, Utterance};

use crate::error::VoiceError;

/// Outcome of one ordered synthesis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthesisReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Synthesize `lines` in parallel and hand each ready utterance to
/// `deliver` in index order.
///
/// Returns early with the first delivery error, or [`VoiceError::Cancelled`]
/// when `cancel` fires while waiting on synthesis.
pub async fn synthesize_in_order<F, Fut>(
    lines: Vec<String>,
    tts: Arc<dyn SpeechSynthesizer>,
    cancel: &CancellationToken,
    mut deliver: F,
) -> Result<SynthesisReport, VoiceError>
where
    F: FnMut(Utterance) -> Fut,
    Fut: Future<Output = Result<(), VoiceError>>,
{
    let total = lines.len();
    let mut report = SynthesisReport::default();
    if total == 0 {
        return Ok(report);
    }

    let (done_tx, mut done_rx) = mpsc::channel::<Utterance>(total);
    let mut tasks = JoinSet::new();
    for (index, text) in lines.into_iter().enumerate() {
        let tts = Arc::clone(&tts);
        let done = done_tx.clone();
        tasks.spawn(async move {
            let utterance = synthesize_line(tts.as_ref(), Utterance::pending(index, text)).await;
            // The loop may already have returned; nothing left to notify.
            let _ = done.send(utterance).await;
        });
    }
    drop(done_tx);

    let mut slots: Vec<Option<Utterance>> = (0..total).map(|_| None).collect();
    let mut next = 0;

    while next < total {
        if let Some(utterance) = slots[next].take() {
            next += 1;
            if utterance.is_ready() {
                deliver(utterance).await?;
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
            continue;
        }

        let completed = tokio::select! {
            () = cancel.cancelled() => return Err(VoiceError::Cancelled),
            completed = done_rx.recv() => completed,
        };

        if let Some(utterance) = completed {
            let index = utterance.index;
            tracing::trace!(index, awaiting = next, "Synthesis line completed");
            slots[index] = Some(utterance);
        } else {
            // Every task is gone; lines that never reported are lost.
            tracing::warn!(missing_from = next, "Synthesis tasks ended early");
            for slot in &mut slots[next..] {
                match slot.take() {
                    Some(utterance) if utterance.is_ready() => {
                        deliver(utterance).await?;
                        report.delivered += 1;
                    }
                    _ => report.failed += 1,
                }
            }
            break;
        }
    }

    tasks.abort_all();
    Ok(report)
}

async fn synthesize_line(tts: &dyn SpeechSynthesizer, utterance: Utterance) -> Utterance {
    match tts.synthesize(&utterance.text).await {
        Ok(audio) if !audio.is_empty() => utterance.ready(audio),
        Ok(_) => {
            tracing::warn!(index = utterance.index, "Synthesis returned no audio, skipping line");
            utterance.failed()
        }
        Err(e) => {
            tracing::warn!(index = utterance.index, error = %e, "Synthesis failed, skipping line");
            utterance.failed()
        }
    }
}
