//! Outbound half of a device WebSocket.
//!
//! Sessions write through [`WsLink`], which hands frames to a single writer
//! task over a bounded channel. The writer owns the socket sink and applies
//! the write deadline to every frame; a missed deadline or a dead socket ends
//! the writer, after which every further write reports a transport error.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use voxhub_voice::{DeviceLink, VoiceError};

/// Frames buffered between sessions and the writer task.
pub const OUTBOUND_CAPACITY: usize = 64;

/// A frame queued for the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
    Close { code: u16, reason: String },
}

impl From<Outgoing> for Message {
    fn from(frame: Outgoing) -> Self {
        match frame {
            Outgoing::Text(text) => Self::Text(text.into()),
            Outgoing::Binary(data) => Self::Binary(data.into()),
            Outgoing::Close { code, reason } => Self::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })),
        }
    }
}

pub struct WsLink {
    tx: mpsc::Sender<Outgoing>,
    write_timeout: Duration,
    closed: AtomicBool,
}

impl WsLink {
    pub fn new(write_timeout: Duration) -> (Self, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let link = Self {
            tx,
            write_timeout,
            closed: AtomicBool::new(false),
        };
        (link, rx)
    }

    async fn push(&self, frame: Outgoing) -> Result<(), VoiceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VoiceError::Transport("connection closing".to_string()));
        }
        self.tx
            .send_timeout(frame, self.write_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => VoiceError::Transport(format!(
                    "write deadline of {}s exceeded",
                    self.write_timeout.as_secs()
                )),
                SendTimeoutError::Closed(_) => {
                    VoiceError::Transport("connection closed".to_string())
                }
            })
    }
}

#[async_trait]
impl DeviceLink for WsLink {
    async fn send_text(&self, text: String) -> Result<(), VoiceError> {
        self.push(Outgoing::Text(text)).await
    }

    async fn send_binary(&self, data: Vec<u8>) -> Result<(), VoiceError> {
        self.push(Outgoing::Binary(data)).await
    }

    async fn close(&self, code: u16, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let frame = Outgoing::Close {
            code,
            reason: reason.to_string(),
        };
        if self
            .tx
            .send_timeout(frame, self.write_timeout)
            .await
            .is_err()
        {
            tracing::debug!(code, "Close frame not queued, writer already gone");
        }
    }
}

/// Drain queued frames into `sink` until a close frame, a failed write or
/// the end of the queue.
pub async fn write_loop<S>(mut sink: S, mut frames: mpsc::Receiver<Outgoing>, write_timeout: Duration)
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    while let Some(frame) = frames.recv().await {
        let closing = matches!(frame, Outgoing::Close { .. });
        match tokio::time::timeout(write_timeout, sink.send(frame.into())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(
                    seconds = write_timeout.as_secs(),
                    "WebSocket write deadline exceeded"
                );
                break;
            }
        }
        if closing {
            break;
        }
    }
    frames.close();
    tracing::debug!("Writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_are_written_in_order_until_close() {
        let (link, rx) = WsLink::new(Duration::from_secs(1));
        link.send_text("{\"type\":\"tts\"}".into()).await.unwrap();
        link.send_binary(vec![1, 2, 3]).await.unwrap();
        link.close(1000, "bye").await;
        link.close(1000, "again").await;

        let mut written: Vec<Message> = Vec::new();
        write_loop(&mut written, rx, Duration::from_secs(1)).await;

        assert_eq!(written.len(), 3);
        assert!(matches!(&written[0], Message::Text(t) if t.as_str() == "{\"type\":\"tts\"}"));
        assert!(matches!(&written[1], Message::Binary(b) if b.to_vec() == vec![1, 2, 3]));
        assert!(matches!(&written[2], Message::Close(Some(frame)) if frame.code == 1000));
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let (link, _rx) = WsLink::new(Duration::from_secs(1));
        link.close(1000, "bye").await;
        assert!(matches!(
            link.send_text("late".into()).await,
            Err(VoiceError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn dead_writer_is_a_transport_error() {
        let (link, rx) = WsLink::new(Duration::from_secs(1));
        drop(rx);
        let err = link.send_binary(vec![0]).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_hits_the_write_deadline() {
        let (link, _rx) = WsLink::new(Duration::from_secs(2));
        for _ in 0..OUTBOUND_CAPACITY {
            link.send_binary(vec![0]).await.unwrap();
        }
        let err = link.send_binary(vec![0]).await.unwrap_err();
        assert!(err.to_string().contains("deadline"));
    }
}
