//! Command-line interface of the `voxhub` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::bootstrap::ServerConfig;

/// Voice session hub for xiaozhi devices.
#[derive(Debug, Parser)]
#[command(name = "voxhub")]
#[command(about = "Serve xiaozhi voice devices over WebSocket")]
#[command(version)]
pub struct Cli {
    /// Address to bind
    #[arg(long, env = "VOXHUB_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, short = 'p', env = "VOXHUB_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Silero VAD model (used when built with the `sherpa` feature)
    #[arg(long = "vad-model", env = "VOXHUB_VAD_MODEL")]
    pub vad_model: Option<PathBuf>,

    /// Allowed CORS origins; all origins when omitted
    #[arg(long = "cors-origin")]
    pub cors_origins: Vec<String>,
}

impl Cli {
    pub fn server_config(&self) -> ServerConfig {
        let cors = if self.cors_origins.is_empty() {
            crate::bootstrap::CorsConfig::AllowAll
        } else {
            crate::bootstrap::CorsConfig::AllowOrigins(self.cors_origins.clone())
        };
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            vad_model: self.vad_model.clone(),
            cors,
        }
    }
}
