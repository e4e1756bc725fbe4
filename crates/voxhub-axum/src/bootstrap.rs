//! Hub bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together.
//! Concrete providers and stores are built here and handed to handlers as
//! port trait objects.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use voxhub_agent::{OpenAiChat, OpenAiChatConfig};
use voxhub_core::{AgentConfig, EnvConfig, MemoryStore, Providers, Stores};
use voxhub_voice::{OpenAiStt, OpenAiSttConfig, OpenAiTts, OpenAiTtsConfig, SessionConfig};

use crate::registry::SessionRegistry;

/// CORS configuration for the HTTP server.
#[derive(Debug, Clone, Default)]
pub enum CorsConfig {
    /// Allow all origins (development mode).
    #[default]
    AllowAll,
    /// Allow specific origins.
    AllowOrigins(Vec<String>),
}

/// Server configuration from the command line.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Silero VAD model, used when built with `sherpa`.
    pub vad_model: Option<PathBuf>,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            vad_model: None,
            cors: CorsConfig::default(),
        }
    }
}

/// Everything handlers need, built once at startup.
pub struct HubContext {
    pub stores: Stores,
    pub providers: Providers,
    pub session: SessionConfig,
    pub registry: Arc<SessionRegistry>,
}

impl HubContext {
    /// Assemble a context from already-built collaborators.
    pub fn new(stores: Stores, providers: Providers, session: SessionConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&stores.devices),
            session.hub.offline_grace,
        ));
        Self {
            stores,
            providers,
            session,
            registry,
        }
    }
}

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the in-memory store and the HTTP provider clients.
pub async fn bootstrap(config: &ServerConfig, env: EnvConfig) -> Result<HubContext> {
    let store = MemoryStore::new(AgentConfig::default())
        .allow_unknown_devices(env.admission.allow_unknown_devices);
    for mac in &env.admission.devices {
        let id = store.bind_device(mac).await;
        tracing::debug!(mac = %mac, device_id = %id, "Bound device");
    }
    tracing::info!(
        devices = env.admission.devices.len(),
        allow_unknown = env.admission.allow_unknown_devices,
        "Device admission configured"
    );
    let stores = Stores::shared(Arc::new(store));

    let stt = OpenAiStt::new(OpenAiSttConfig::from_settings(&env.providers))
        .context("Failed to build STT client")?;
    let tts = OpenAiTts::new(OpenAiTtsConfig::from_settings(&env.providers))
        .context("Failed to build TTS client")?;
    let chat = OpenAiChat::new(OpenAiChatConfig::from_settings(&env.providers))
        .context("Failed to build chat client")?;
    if env.providers.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set, provider calls will be unauthenticated");
    }
    let providers = Providers::new(Arc::new(stt), Arc::new(tts), Arc::new(chat));

    let session = SessionConfig {
        hub: env.hub,
        vad_model: config.vad_model.clone(),
        ..SessionConfig::default()
    };

    Ok(HubContext::new(stores, providers, session))
}

/// Bootstrap and serve until the process is stopped.
pub async fn start_server(config: ServerConfig, env: EnvConfig) -> Result<()> {
    use tokio::net::TcpListener;

    let ctx = bootstrap(&config, env).await?;
    let app = crate::routes::create_router(ctx, &config.cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("voxhub listening on ws://{}/xiaozhi/v1/", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
