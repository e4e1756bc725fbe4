//! Per-connection voice session: the turn orchestrator.
//!
//! A [`Session`] owns everything one connected device needs: capture and
//! recognition, the agent, the MCP channel, and the workers that move work
//! between them.
//!
//! ```text
//! binary frames ──► Recognizer ──► transcripts ─┐
//!                                               ├──► control worker ──► turn queue ──► turn worker
//! listen{text} ─────────────────────────────────┘                                       │
//!                                                      agent ◄── deadline ◄─────────────┘
//!                                                        │
//!                                 ordered synthesis ──► paced transmitter ──► DeviceLink
//! ```
//!
//! # Design Principles
//!
//! - **Control plane never waits on work**: `handle_text` / `handle_binary`
//!   only parse, update lock-guarded fields and enqueue.
//! - **One turn at a time**: turns run strictly in arrival order on a single
//!   worker, which waits until the agent's tools are ready.
//! - **Everything is tracked**: every spawned task is on the session's
//!   [`TaskTracker`], so [`Session::close`] returns only after all of them
//!   have exited.
//!
//! # Cancellation
//!
//! One session-wide token. Cancelling it stops capture, aborts any active
//! transmission, ends the MCP channel and makes every worker exit. Workers
//! cancel the token themselves on a fatal transport error or when the agent
//! asked to end the conversation; the connection owner watches
//! [`Session::cancelled`] and then calls [`Session::close`].

mod control;
mod link;
mod turn;

pub use link::{CLOSE_NORMAL, DeviceLink};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use voxhub_agent::{Agent, ExitIntent, Toolbox};
use voxhub_core::contracts::{
    ClientMessage, HelloMessage, ListenMessage, ProtocolError, ServerHello, ServerMessage,
};
use voxhub_core::{
    AgentConfig, AudioParams, DEVICE_SAMPLE_RATE, HubSettings, Providers, SessionEvent,
    SessionInfo, SessionState, Stores,
};
use voxhub_mcp::{DeviceTools, McpClient, Multiplexer, MultiplexerConfig};

use crate::asr::Recognizer;
use crate::error::VoiceError;
use crate::transmit::{TransmitConfig, Transmitter};
use crate::vad::{VadConfig, build_detector};

use link::{LinkFrames, McpOutbound, send_message};

/// Engine-level configuration shared by every session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub hub: HubSettings,
    pub vad: VadConfig,
    /// Silero model used when the `sherpa` feature is enabled.
    pub vad_model: Option<PathBuf>,
}

/// Collaborators injected into a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub providers: Providers,
    pub stores: Stores,
    pub link: Arc<dyn DeviceLink>,
}

pub struct Session {
    info: SessionInfo,
    settings: HubSettings,
    link: Arc<dyn DeviceLink>,
    frames: LinkFrames,
    stores: Stores,
    providers: Providers,
    agent: Agent,
    exit: Arc<ExitIntent>,
    device_tools: Arc<DeviceTools>,
    mux: Multiplexer,
    transmitter: Transmitter,
    recognizer: Mutex<Recognizer>,
    turns: mpsc::Sender<String>,
    state: Mutex<SessionState>,
    audio: Mutex<AudioParams>,
    ready: Arc<AtomicBool>,
    mcp_started: AtomicBool,
    dropped_turns: AtomicU64,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Session {
    /// Build a session and start its workers.
    pub fn spawn(
        info: SessionInfo,
        agent_config: AgentConfig,
        deps: SessionDeps,
        config: &SessionConfig,
    ) -> Result<Arc<Self>, VoiceError> {
        let settings = config.hub.clone();
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let (transcripts_tx, transcripts_rx) = mpsc::channel(settings.segment_queue_capacity.max(1));
        let (turns_tx, turns_rx) = mpsc::channel(settings.turn_queue_capacity.max(1));

        let detector = build_detector(
            config.vad.clone(),
            DEVICE_SAMPLE_RATE,
            config.vad_model.as_deref(),
        )?;
        let recognizer = Recognizer::new(
            Arc::clone(&deps.providers.stt),
            detector,
            transcripts_tx,
            tracker.clone(),
            cancel.clone(),
            settings.segment_queue_capacity,
        )?;

        let outbound = Arc::new(McpOutbound {
            link: Arc::clone(&deps.link),
            session_id: info.id.clone(),
        });
        let (mux, notifications) = Multiplexer::spawn(
            outbound,
            MultiplexerConfig::from_settings(&settings),
            &tracker,
            &cancel,
        );
        let device_tools = Arc::new(DeviceTools::new(McpClient::new(mux.clone())));

        let exit = ExitIntent::new();
        let toolbox = Toolbox::new()
            .with(exit.clone())
            .with(device_tools.clone());
        let agent = Agent::new(
            Arc::clone(&deps.providers.chat),
            Arc::new(toolbox),
            agent_config,
        )
        .with_max_tool_rounds(settings.max_tool_rounds);

        let session = Arc::new(Self {
            frames: LinkFrames(Arc::clone(&deps.link)),
            link: deps.link,
            stores: deps.stores,
            providers: deps.providers,
            transmitter: Transmitter::new(TransmitConfig::from_settings(&settings)),
            settings,
            info,
            agent,
            exit,
            device_tools,
            mux,
            recognizer: Mutex::new(recognizer),
            turns: turns_tx,
            state: Mutex::new(SessionState::Idle),
            audio: Mutex::new(AudioParams::default()),
            ready: Arc::new(AtomicBool::new(false)),
            mcp_started: AtomicBool::new(false),
            dropped_turns: AtomicU64::new(0),
            cancel,
            tracker,
        });

        session.tracker.spawn(control::run(
            Arc::clone(&session),
            transcripts_rx,
            notifications,
        ));
        session
            .tracker
            .spawn(turn::run(Arc::clone(&session), turns_rx));

        tracing::info!(
            session_id = %session.info.id,
            device_id = %session.info.device_id,
            "Session started"
        );
        Ok(session)
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    #[must_use]
    pub const fn info(&self) -> &SessionInfo {
        &self.info
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Whether the agent's tools are initialized and turns may run.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether server-side capture is running.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        lock(&self.recognizer).is_running()
    }

    /// Client audio parameters from the last hello.
    #[must_use]
    pub fn audio_params(&self) -> AudioParams {
        lock(&self.audio).clone()
    }

    /// Segments lost because recognition could not keep up.
    #[must_use]
    pub fn dropped_segments(&self) -> u64 {
        lock(&self.recognizer).dropped_segments()
    }

    /// Text turns lost because the turn queue was full.
    #[must_use]
    pub fn dropped_turns(&self) -> u64 {
        self.dropped_turns.load(Ordering::Relaxed)
    }

    /// Resolves once the session has been asked to end.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ── Inbound ────────────────────────────────────────────────────────────

    /// Handle one text frame from the device.
    ///
    /// Malformed and unknown messages are logged and ignored. Only a failed
    /// write of the hello reply is returned as an error.
    pub async fn handle_text(&self, text: &str) -> Result<(), VoiceError> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(ProtocolError::UnknownType(kind)) => {
                tracing::info!(kind = %kind, "Ignoring unknown message type");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed message");
                return Ok(());
            }
        };
        tracing::debug!(kind = message.kind(), "Device message");

        match message {
            ClientMessage::Hello(hello) => self.on_hello(hello).await?,
            ClientMessage::Listen(listen) => self.on_listen(&listen),
            ClientMessage::Abort(abort) => {
                tracing::info!(reason = ?abort.reason, "Abort");
                self.stop_capture();
            }
            ClientMessage::Mcp(mcp) => {
                if let Err(e) = self.mux.receive(mcp.payload) {
                    tracing::warn!(error = %e, "MCP payload rejected");
                }
            }
            ClientMessage::Iot(iot) => {
                tracing::debug!(fields = iot.body.len(), "IoT message");
            }
        }
        Ok(())
    }

    /// Handle one binary audio frame from the device.
    pub fn handle_binary(&self, packet: &[u8]) {
        if self.cancel.is_cancelled() {
            return;
        }
        if !lock(&self.audio).is_opus() {
            tracing::warn!("Dropping audio frame: negotiated format is not opus");
            return;
        }
        match lock(&self.recognizer).write(packet) {
            Ok(queued) if queued > 0 => tracing::debug!(queued, "Speech segment queued"),
            Ok(_) => {}
            Err(VoiceError::NotActive) => tracing::trace!("Audio frame outside capture"),
            Err(e) => tracing::warn!(error = %e, "Audio frame rejected"),
        }
    }

    async fn on_hello(&self, hello: HelloMessage) -> Result<(), VoiceError> {
        if let Some(params) = hello.audio_params {
            if !params.is_opus() {
                tracing::warn!(format = %params.format, "Device audio format is not opus");
            }
            *lock(&self.audio) = params;
        }

        let reply = ServerMessage::Hello(ServerHello::locked());
        send_message(self.link.as_ref(), &self.info.id, &reply).await?;

        if hello.features.mcp {
            self.start_tool_discovery();
        } else {
            self.mark_ready();
        }
        Ok(())
    }

    fn on_listen(&self, listen: &ListenMessage) {
        tracing::info!(state = ?listen.state, mode = ?listen.mode, "Listen");
        if listen.starts_auto_capture() {
            self.start_capture();
        }
        if let Some(text) = listen.turn_text() {
            tracing::info!(text, "Text turn from device");
            match self.try_enqueue_turn(text.to_string()) {
                Ok(()) => {}
                Err(VoiceError::QueueFull(_)) => {
                    let total = self.dropped_turns.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        text,
                        dropped_total = total,
                        "Turn queue full, dropping text turn"
                    );
                }
                Err(e) => tracing::debug!(error = %e, "Text turn not queued"),
            }
        }
    }

    // ── Capture ────────────────────────────────────────────────────────────

    fn start_capture(&self) {
        if lock(&self.recognizer).start() {
            self.transition(SessionEvent::CaptureStarted);
        }
    }

    pub(crate) fn stop_capture(&self) {
        lock(&self.recognizer).stop();
    }

    // ── Turns ──────────────────────────────────────────────────────────────

    fn try_enqueue_turn(&self, text: String) -> Result<(), VoiceError> {
        self.turns.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => VoiceError::QueueFull("turn"),
            mpsc::error::TrySendError::Closed(_) => VoiceError::Cancelled,
        })?;
        self.transition(SessionEvent::TurnQueued);
        Ok(())
    }

    /// Enqueue a turn, waiting for room.
    pub(crate) async fn enqueue_turn(&self, text: String) -> Result<(), VoiceError> {
        tokio::select! {
            () = self.cancel.cancelled() => return Err(VoiceError::Cancelled),
            sent = self.turns.send(text) => sent.map_err(|_| VoiceError::Cancelled)?,
        }
        self.transition(SessionEvent::TurnQueued);
        Ok(())
    }

    pub(crate) fn transition(&self, event: SessionEvent) -> SessionState {
        let mut state = lock(&self.state);
        let next = state.apply(event);
        if next != *state {
            tracing::debug!(from = %*state, to = %next, ?event, "Session state");
            *state = next;
        }
        next
    }

    // ── Readiness ──────────────────────────────────────────────────────────

    fn mark_ready(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            tracing::debug!("Session ready");
        }
    }

    fn start_tool_discovery(&self) {
        if self.mcp_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let tools = Arc::clone(&self.device_tools);
        let ready = Arc::clone(&self.ready);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                result = tools.discover() => {
                    if let Err(e) = result {
                        tracing::error!(
                            error = %e,
                            "MCP initialization failed, continuing with internal tools"
                        );
                    }
                }
            }
            ready.store(true, Ordering::Release);
        });
    }

    /// Re-list device tools after the device reports a change.
    ///
    /// Runs on its own task so the control worker keeps draining transcripts
    /// while the device answers.
    pub(crate) fn refresh_tools(&self) {
        let tools = Arc::clone(&self.device_tools);
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                result = tools.refresh() => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Device tool refresh failed");
                    }
                }
            }
        });
    }

    // ── Teardown ───────────────────────────────────────────────────────────

    /// Ask the session to end without waiting for its workers.
    pub fn request_close(&self) {
        self.cancel.cancel();
    }

    /// Cancel all work and wait until every worker has exited. Idempotent.
    pub async fn close(&self) {
        let first = {
            let mut state = lock(&self.state);
            let first = !state.is_closed();
            *state = state.apply(SessionEvent::Close);
            first
        };

        self.cancel.cancel();
        self.stop_capture();
        self.mux.close();
        self.tracker.close();
        self.tracker.wait().await;

        if first {
            tracing::info!(
                session_id = %self.info.id,
                dropped_segments = self.dropped_segments(),
                dropped_turns = self.dropped_turns(),
                "Session closed"
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
