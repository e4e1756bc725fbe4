//! Control worker: turns transcripts and device notifications into work.

use std::sync::Arc;

use tokio::sync::mpsc;
use voxhub_mcp::JsonRpcNotification;

use super::Session;

const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

pub(super) async fn run(
    session: Arc<Session>,
    mut transcripts: mpsc::Receiver<String>,
    mut notifications: mpsc::Receiver<JsonRpcNotification>,
) {
    let mut notifications_open = true;
    loop {
        tokio::select! {
            () = session.cancel.cancelled() => break,
            transcript = transcripts.recv() => {
                let Some(text) = transcript else { break };
                // One utterance per turn: capture resumes on the next listen.
                session.stop_capture();
                tracing::info!(text = %text, "Transcript");
                if session.enqueue_turn(text).await.is_err() {
                    break;
                }
            }
            notification = notifications.recv(), if notifications_open => match notification {
                Some(n) if n.method == TOOLS_LIST_CHANGED => session.refresh_tools(),
                Some(n) => tracing::debug!(method = %n.method, "MCP notification"),
                None => notifications_open = false,
            },
        }
    }
    tracing::debug!("Control worker stopped");
}
