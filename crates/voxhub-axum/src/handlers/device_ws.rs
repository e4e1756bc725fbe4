//! Device WebSocket endpoint.
//!
//! `GET /xiaozhi/v1/` admits a device and upgrades the connection to the
//! duplex session channel: JSON control messages as text frames, Opus audio
//! as binary frames.
//!
//! ## Admission
//!
//! | Header | Required | Use |
//! |---|---|---|
//! | `Device-Id` | yes | MAC address, must belong to a bound device |
//! | `Client-Id` | yes | Recorded on the session |
//! | `Authorization` | no | `Bearer <token>`, recorded only |
//! | `Protocol-Version` | no | Defaults to `1` |
//!
//! Missing ids answer 400, an unknown or unbound device 403, a store failure
//! 500. All checks run before the upgrade.
//!
//! ## Lifecycle
//!
//! 1. Split the socket; a writer task owns the sink (see [`crate::ws_link`]).
//! 2. Spawn the [`Session`] and register it, shutting down any previous
//!    connection of the same device.
//! 3. Read frames into the session until the peer closes, the read idles
//!    past the idle timeout, or the session cancels itself.
//! 4. Close the session, which waits for every worker, then release the
//!    registry entry and let the writer flush a close frame.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tracing::Instrument;
use voxhub_core::{AgentConfig, SessionInfo};
use voxhub_voice::{CLOSE_NORMAL, DeviceLink, Session, SessionDeps};

use crate::error::HttpError;
use crate::state::AppState;
use crate::ws_link::{WsLink, write_loop};

/// Admission data carried in the upgrade request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHeaders {
    pub device_id: String,
    pub client_id: String,
    pub token: Option<String>,
    pub protocol_version: String,
}

impl DeviceHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, HttpError> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        let device_id =
            header("device-id").ok_or_else(|| HttpError::BadRequest("Missing Device-Id".into()))?;
        let client_id =
            header("client-id").ok_or_else(|| HttpError::BadRequest("Missing Client-Id".into()))?;
        let token = header("authorization").map(|value| {
            value
                .strip_prefix("Bearer ")
                .map_or_else(|| value.clone(), |t| t.trim().to_string())
        });

        Ok(Self {
            device_id,
            client_id,
            token,
            protocol_version: header("protocol-version").unwrap_or_else(|| "1".to_string()),
        })
    }
}

/// `GET /xiaozhi/v1/`: admit the device, then upgrade.
pub async fn device_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, HttpError> {
    let admission = DeviceHeaders::from_headers(&headers)?;
    let device = state
        .stores
        .devices
        .validate_device(&admission.device_id)
        .await
        .map_err(HttpError::from_admission)?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let session_id = state.stores.sessions.create_session(&device.id).await?;
    let agent = state
        .stores
        .agents
        .agent_config(device.agent_id.as_deref())
        .await?;

    let info = SessionInfo::new(session_id, device.id, admission.client_id)
        .with_protocol_version(admission.protocol_version);
    tracing::info!(
        device_id = %info.device_id,
        session_id = %info.id,
        mac = %admission.device_id,
        authorized = admission.token.is_some(),
        "Device admitted"
    );

    Ok(ws
        .on_upgrade(move |socket| {
            let span = tracing::info_span!(
                "device",
                device_id = %info.device_id,
                session_id = %info.id
            );
            run_connection(socket, state, info, agent).instrument(span)
        })
        .into_response())
}

async fn run_connection(socket: WebSocket, state: AppState, info: SessionInfo, agent: AgentConfig) {
    let hub = &state.session.hub;
    let (sink, mut stream) = socket.split();

    let (link, outgoing) = WsLink::new(hub.write_timeout);
    let link = Arc::new(link);
    let writer = tokio::spawn(write_loop(sink, outgoing, hub.write_timeout));

    let device_id = info.device_id.clone();
    let deps = SessionDeps {
        providers: state.providers.clone(),
        stores: state.stores.clone(),
        link: link.clone(),
    };
    let session = match Session::spawn(info, agent, deps, &state.session) {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start session");
            link.close(1011, "session setup failed").await;
            let _ = writer.await;
            return;
        }
    };

    let registration = state.registry.register(&device_id, Arc::clone(&session));
    if let Some(previous) = registration.replaced {
        previous.request_close();
    }
    if let Err(e) = state.stores.devices.set_presence(&device_id, true).await {
        tracing::warn!(error = %e, "Failed to record device online");
    }

    read_loop(&session, &mut stream, hub.idle_timeout).await;

    session.close().await;
    state.registry.release(&device_id, registration.generation);

    link.close(CLOSE_NORMAL, "session closed").await;
    match tokio::time::timeout(hub.write_timeout, writer).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Writer task failed"),
        Err(_) => tracing::warn!("Writer did not finish before the write deadline"),
    }
    tracing::info!("Connection closed");
}

async fn read_loop<S>(session: &Session, stream: &mut S, idle_timeout: std::time::Duration)
where
    S: futures_util::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = tokio::select! {
            () = session.cancelled() => {
                tracing::debug!("Session ended itself");
                return;
            }
            frame = tokio::time::timeout(idle_timeout, stream.next()) => frame,
        };

        let message = match frame {
            Err(_) => {
                tracing::info!(seconds = idle_timeout.as_secs(), "Idle timeout");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "WebSocket read failed");
                return;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                if let Err(e) = session.handle_text(text.as_str()).await {
                    tracing::warn!(error = %e, "Failed to answer device message");
                    return;
                }
            }
            Message::Binary(data) => session.handle_binary(&data),
            Message::Close(frame) => {
                tracing::debug!(code = frame.as_ref().map(|f| f.code), "Peer closed");
                return;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}
