//! Request/response multiplexer for MCP over the device connection.
//!
//! Outbound requests are registered in a pending table keyed by id before
//! they are written, then the caller waits on a oneshot for the matching
//! response. Inbound payloads enter through [`Multiplexer::receive`] into a
//! bounded queue drained by one dispatch worker, which routes responses to
//! their waiters and forwards notifications.
//!
//! ```text
//! send_request ──► pending[id] = tx ──► Outbound::send
//!                                              │
//! receive(payload) ──► inbound queue ──► dispatch worker ──► pending.remove(id) ──► tx
//!                                              └──► notifications
//! ```
//!
//! # Cancellation
//!
//! [`Multiplexer::close`] (or cancelling the session token) wakes every
//! waiter with [`McpError::Closed`] and empties the pending table. The
//! dispatch worker exits with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use voxhub_core::HubSettings;

use crate::error::McpError;
use crate::jsonrpc::{Inbound, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};

/// Default wait for a response when the caller gives no deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default depth of the inbound queue.
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

const NOTIFICATION_CAPACITY: usize = 32;

/// Writes one JSON-RPC payload to the device.
///
/// Implementations wrap the payload in the connection's `mcp` envelope.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, payload: Value) -> Result<(), McpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiplexerConfig {
    pub request_timeout: Duration,
    pub inbound_capacity: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

impl MultiplexerConfig {
    #[must_use]
    pub const fn from_settings(settings: &HubSettings) -> Self {
        Self {
            request_timeout: settings.mcp_request_timeout,
            inbound_capacity: settings.mcp_inbound_capacity,
        }
    }
}

type PendingTable = HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>;

struct Shared {
    pending: Mutex<PendingTable>,
    outbound: Arc<dyn Outbound>,
    inbound: mpsc::Sender<Value>,
    closed: CancellationToken,
    next_id: AtomicI64,
    request_timeout: Duration,
}

impl Shared {
    fn pending(&self) -> std::sync::MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a response to its waiter. Returns whether one was waiting.
    fn deliver(&self, response: JsonRpcResponse) -> bool {
        let Some(id) = response.id.as_ref().map(RequestId::normalized) else {
            tracing::warn!(error = ?response.error, "MCP response without id dropped");
            return false;
        };
        let waiter = self.pending().remove(&id);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!(%id, "MCP waiter gone before response arrived");
                }
                true
            }
            None => {
                tracing::warn!(%id, "Late or unknown MCP response dropped");
                false
            }
        }
    }
}

/// Removes the pending entry when a request finishes, however it finishes.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending().remove(&self.id);
    }
}

/// Cloneable handle to one device's MCP channel.
#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<Shared>,
}

impl Multiplexer {
    /// Create the multiplexer and spawn its dispatch worker on `tracker`.
    ///
    /// Notifications from the device arrive on the returned receiver. The
    /// worker stops when `cancel` fires or [`close`](Self::close) is called.
    pub fn spawn(
        outbound: Arc<dyn Outbound>,
        config: MultiplexerConfig,
        tracker: &TaskTracker,
        cancel: &CancellationToken,
    ) -> (Self, mpsc::Receiver<JsonRpcNotification>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CAPACITY);

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            outbound,
            inbound: inbound_tx,
            closed: cancel.child_token(),
            next_id: AtomicI64::new(1),
            request_timeout: config.request_timeout,
        });

        tracker.spawn(dispatch(Arc::clone(&shared), inbound_rx, notify_tx));
        (Self { shared }, notify_rx)
    }

    /// Whether the channel has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Requests currently waiting for a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.pending().len()
    }

    /// The wait applied when a caller gives no deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.shared.request_timeout
    }

    /// Send a request and wait for its response.
    ///
    /// `deadline` overrides the configured request timeout.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Option<Duration>,
    ) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }

        let id = RequestId::Number(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.shared.pending().insert(id.clone(), tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            id: id.clone(),
        };

        let request = serde_json::to_value(JsonRpcRequest::new(id.clone(), method, params))?;

        // The deadline covers the write as well as the wait for the response.
        let wait = deadline.unwrap_or(self.shared.request_timeout);
        tokio::select! {
            () = self.shared.closed.cancelled() => Err(McpError::Closed),
            exchanged = tokio::time::timeout(wait, self.exchange(&id, method, request, rx)) => {
                match exchanged {
                    Ok(result) => result,
                    Err(_) => Err(McpError::Timeout {
                        method: method.to_string(),
                        seconds: wait.as_secs(),
                    }),
                }
            }
        }
    }

    async fn exchange(
        &self,
        id: &RequestId,
        method: &str,
        request: Value,
        rx: oneshot::Receiver<JsonRpcResponse>,
    ) -> Result<Value, McpError> {
        self.shared.outbound.send(request).await?;
        tracing::debug!(%id, method, "MCP request sent");
        match rx.await {
            Ok(response) => response.into_result(),
            // Sender dropped: the table was cleared by close().
            Err(_) => Err(McpError::Closed),
        }
    }

    /// Send a notification; no response is expected.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        let notification = JsonRpcNotification::new(method, params);
        self.shared
            .outbound
            .send(serde_json::to_value(&notification)?)
            .await
    }

    /// Accept one inbound payload from the device.
    ///
    /// Never waits: a full queue rejects the payload with
    /// [`McpError::InboundFull`].
    pub fn receive(&self, payload: Value) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        self.shared.inbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!("MCP inbound queue full, rejecting payload");
                McpError::InboundFull
            }
            mpsc::error::TrySendError::Closed(_) => McpError::Closed,
        })
    }

    /// Cancel every waiter and clear the pending table. Idempotent.
    pub fn close(&self) {
        self.shared.closed.cancel();
        let dropped = std::mem::take(&mut *self.shared.pending()).len();
        if dropped > 0 {
            tracing::debug!(dropped, "MCP transport closed with requests in flight");
        }
    }
}

async fn dispatch(
    shared: Arc<Shared>,
    mut inbound: mpsc::Receiver<Value>,
    notifications: mpsc::Sender<JsonRpcNotification>,
) {
    loop {
        let payload = tokio::select! {
            () = shared.closed.cancelled() => break,
            next = inbound.recv() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        match Inbound::decode(payload) {
            Ok(Inbound::Response(response)) => {
                shared.deliver(response);
            }
            Ok(Inbound::Notification(notification)) => {
                tracing::debug!(method = %notification.method, "MCP notification");
                if let Err(mpsc::error::TrySendError::Full(n)) =
                    notifications.try_send(notification)
                {
                    tracing::warn!(method = %n.method, "Notification queue full, dropping");
                }
            }
            Ok(Inbound::Request { id, method }) => {
                tracing::debug!(%id, %method, "Ignoring device-initiated MCP request");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed MCP payload dropped");
            }
        }
    }

    // Wake anyone still waiting.
    shared.closed.cancel();
    shared.pending().clear();
    tracing::debug!("MCP dispatch worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Forwards every outbound payload to a channel.
    struct Capture(mpsc::UnboundedSender<Value>);

    #[async_trait]
    impl Outbound for Capture {
        async fn send(&self, payload: Value) -> Result<(), McpError> {
            self.0
                .send(payload)
                .map_err(|e| McpError::Send(e.to_string()))
        }
    }

    struct Broken;

    #[async_trait]
    impl Outbound for Broken {
        async fn send(&self, _payload: Value) -> Result<(), McpError> {
            Err(McpError::Send("socket closed".into()))
        }
    }

    /// Takes longer to write than the default request timeout.
    struct Stalled;

    #[async_trait]
    impl Outbound for Stalled {
        async fn send(&self, _payload: Value) -> Result<(), McpError> {
            tokio::time::sleep(Duration::from_secs(45)).await;
            Ok(())
        }
    }

    fn setup(
        config: MultiplexerConfig,
    ) -> (
        Multiplexer,
        mpsc::UnboundedReceiver<Value>,
        mpsc::Receiver<JsonRpcNotification>,
        TaskTracker,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let (mux, notes) = Multiplexer::spawn(
            Arc::new(Capture(tx)),
            config,
            &tracker,
            &CancellationToken::new(),
        );
        (mux, rx, notes, tracker)
    }

    #[tokio::test]
    async fn response_resolves_waiter_and_clears_entry() {
        let (mux, mut sent, _notes, _tracker) = setup(MultiplexerConfig::default());

        let caller = mux.clone();
        let request =
            tokio::spawn(async move { caller.send_request("tools/list", None, None).await });

        let outbound = sent.recv().await.unwrap();
        assert_eq!(outbound["method"], "tools/list");
        assert_eq!(mux.pending_requests(), 1);

        mux.receive(json!({"jsonrpc":"2.0","id":outbound["id"],"result":{"tools":[]}}))
            .unwrap();
        let result = request.await.unwrap().unwrap();
        assert_eq!(result, json!({"tools": []}));
        assert_eq!(mux.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_deadline_times_out_at_configured_default() {
        let (mux, _sent, _notes, _tracker) = setup(MultiplexerConfig::default());

        let start = tokio::time::Instant::now();
        let err = mux.send_request("ping", None, None).await.unwrap_err();

        assert!(matches!(err, McpError::Timeout { seconds: 30, .. }));
        assert_eq!(start.elapsed(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(mux.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_write_counts_against_the_timeout() {
        let tracker = TaskTracker::new();
        let (mux, _notes) = Multiplexer::spawn(
            Arc::new(Stalled),
            MultiplexerConfig::default(),
            &tracker,
            &CancellationToken::new(),
        );

        let start = tokio::time::Instant::now();
        let err = mux.send_request("tools/list", None, None).await.unwrap_err();

        assert!(matches!(err, McpError::Timeout { seconds: 30, .. }));
        assert_eq!(start.elapsed(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(mux.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_wins() {
        let (mux, _sent, _notes, _tracker) = setup(MultiplexerConfig::default());
        let start = tokio::time::Instant::now();
        let err = mux
            .send_request("ping", None, Some(Duration::from_secs(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout { seconds: 2, .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn close_wakes_all_waiters() {
        let (mux, mut sent, _notes, _tracker) = setup(MultiplexerConfig::default());

        let mut waiters = Vec::new();
        for _ in 0..3 {
            let caller = mux.clone();
            waiters.push(tokio::spawn(async move {
                caller.send_request("tools/call", None, None).await
            }));
        }
        for _ in 0..3 {
            sent.recv().await.unwrap();
        }

        mux.close();
        mux.close();
        for waiter in waiters {
            assert!(matches!(waiter.await.unwrap(), Err(McpError::Closed)));
        }
        assert_eq!(mux.pending_requests(), 0);
        assert!(matches!(
            mux.send_request("x", None, None).await,
            Err(McpError::Closed)
        ));
        assert!(matches!(mux.receive(json!({})), Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn write_failure_leaves_no_pending_entry() {
        let tracker = TaskTracker::new();
        let (mux, _notes) = Multiplexer::spawn(
            Arc::new(Broken),
            MultiplexerConfig::default(),
            &tracker,
            &CancellationToken::new(),
        );
        assert!(matches!(
            mux.send_request("initialize", None, None).await,
            Err(McpError::Send(_))
        ));
        assert_eq!(mux.pending_requests(), 0);
    }

    #[tokio::test]
    async fn notifications_are_forwarded() {
        let (mux, _sent, mut notes, _tracker) = setup(MultiplexerConfig::default());
        mux.receive(json!({"jsonrpc":"2.0","method":"notifications/tools/list_changed"}))
            .unwrap();
        let note = notes.recv().await.unwrap();
        assert_eq!(note.method, "notifications/tools/list_changed");
    }

    #[tokio::test]
    async fn session_cancel_stops_dispatch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();
        let (mux, _notes) = Multiplexer::spawn(
            Arc::new(Capture(tx)),
            MultiplexerConfig::default(),
            &tracker,
            &cancel,
        );

        cancel.cancel();
        tracker.close();
        tracker.wait().await;
        assert!(mux.is_closed());
    }
}
