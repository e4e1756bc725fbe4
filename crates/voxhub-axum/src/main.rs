use anyhow::Context;
use clap::Parser;
use voxhub_axum::{Cli, init_logging, start_server};
use voxhub_core::EnvConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before logging so RUST_LOG from the file applies
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let env = EnvConfig::from_env().context("Invalid VOXHUB_* configuration")?;

    start_server(cli.server_config(), env).await
}
