//! Turn worker: one turn at a time, in arrival order.
//!
//! Each turn runs the agent under a deadline, then streams the reply as
//! ordered utterances framed by `tts start` / `tts stop`.

use std::sync::Arc;

use tokio::sync::mpsc;
use voxhub_core::contracts::{ServerMessage, SttMessage, TtsMessage};
use voxhub_core::{
    DEVICE_SAMPLE_RATE, HistoryRole, SessionEvent, Utterance, split_response_lines,
};

use super::link::{CLOSE_NORMAL, send_message};
use super::Session;
use crate::error::VoiceError;
use crate::synthesis::synthesize_in_order;

pub(super) async fn run(session: Arc<Session>, mut turns: mpsc::Receiver<String>) {
    if !wait_until_ready(&session).await {
        return;
    }

    loop {
        let text = tokio::select! {
            () = session.cancel.cancelled() => break,
            turn = turns.recv() => match turn {
                Some(text) => text,
                None => break,
            },
        };
        session.transition(SessionEvent::TurnStarted);

        match run_turn(&session, &text).await {
            Ok(()) => {}
            Err(VoiceError::Cancelled) => break,
            Err(e) if e.is_fatal() => {
                tracing::error!(error = %e, "Turn failed, closing session");
                session.cancel.cancel();
                break;
            }
            Err(e) => tracing::warn!(error = %e, "Turn failed"),
        }

        if session.exit.take() {
            tracing::info!("Exit requested by the agent, closing connection");
            session.link.close(CLOSE_NORMAL, "goodbye").await;
            session.cancel.cancel();
            break;
        }
    }
    tracing::debug!("Turn worker stopped");
}

/// Poll until the agent's tools are initialized. Returns `false` on cancel.
async fn wait_until_ready(session: &Session) -> bool {
    let mut poll = tokio::time::interval(session.settings.ready_poll_interval);
    loop {
        tokio::select! {
            () = session.cancel.cancelled() => return false,
            _ = poll.tick() => {
                if session.is_ready() {
                    return true;
                }
            }
        }
    }
}

async fn run_turn(session: &Session, text: &str) -> Result<(), VoiceError> {
    let deadline = session.settings.llm_timeout;
    let response = tokio::select! {
        () = session.cancel.cancelled() => return Err(VoiceError::Cancelled),
        result = tokio::time::timeout(deadline, session.agent.respond(text)) => result,
    };

    let response = match response {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Agent failed, abandoning turn");
            session.transition(SessionEvent::ModelAbandoned);
            return Ok(());
        }
        Err(_) => {
            tracing::warn!(
                seconds = deadline.as_secs(),
                "Agent deadline exceeded, abandoning turn"
            );
            session.transition(SessionEvent::ModelAbandoned);
            return Ok(());
        }
    };

    session.transition(SessionEvent::ModelAnswered);
    save_history(session, text, &response).await;

    let result = speak(session, text, &response).await;
    session.transition(SessionEvent::SpeechFinished);
    result
}

async fn speak(session: &Session, text: &str, response: &str) -> Result<(), VoiceError> {
    let id = session.id();
    let link = session.link.as_ref();

    send_message(link, id, &ServerMessage::Tts(TtsMessage::start(DEVICE_SAMPLE_RATE))).await?;
    send_message(
        link,
        id,
        &ServerMessage::Stt(SttMessage {
            text: text.to_string(),
        }),
    )
    .await?;

    let lines = split_response_lines(response);
    let tts = Arc::clone(&session.providers.tts);
    let report = synthesize_in_order(lines, tts, &session.cancel, move |utterance| {
        stream_utterance(session, utterance)
    })
    .await?;
    tracing::info!(
        delivered = report.delivered,
        failed = report.failed,
        "Turn spoken"
    );

    tokio::select! {
        () = session.cancel.cancelled() => return Err(VoiceError::Cancelled),
        () = tokio::time::sleep(session.settings.empty_response_pause) => {}
    }
    send_message(link, id, &ServerMessage::Tts(TtsMessage::stop())).await
}

async fn stream_utterance(session: &Session, utterance: Utterance) -> Result<(), VoiceError> {
    let Some(audio) = utterance.audio else {
        return Ok(());
    };
    send_message(
        session.link.as_ref(),
        session.id(),
        &ServerMessage::Tts(TtsMessage::sentence_start(utterance.text)),
    )
    .await?;

    let bound = audio.duration() + session.settings.utterance_grace;
    let streamed = tokio::time::timeout(
        bound,
        session
            .transmitter
            .transmit(&audio, &session.frames, &session.cancel),
    )
    .await;

    match streamed {
        Ok(Ok(stats)) => {
            tracing::debug!(
                index = utterance.index,
                frames = stats.frames,
                bytes = stats.bytes,
                "Utterance streamed"
            );
            Ok(())
        }
        Ok(Err(e)) if e.is_fatal() || matches!(e, VoiceError::Cancelled) => Err(e),
        Ok(Err(e)) => {
            tracing::warn!(index = utterance.index, error = %e, "Utterance skipped");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(
                index = utterance.index,
                seconds = bound.as_secs(),
                "Utterance stream exceeded its deadline"
            );
            Ok(())
        }
    }
}

async fn save_history(session: &Session, user: &str, assistant: &str) {
    let history = &session.stores.history;
    for (role, content) in [(HistoryRole::User, user), (HistoryRole::Assistant, assistant)] {
        if let Err(e) = history.save_message(session.id(), role, content).await {
            tracing::warn!(role = role.as_str(), error = %e, "Failed to save history");
        }
    }
}
