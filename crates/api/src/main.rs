//! Paddy Inference Service - Main Entry Point

use anyhow::Context;
use api::config::AppConfig;
use api::{build_state, init_logging, run_server};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Paddy leaf disease, variety and age prediction service")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "PADDY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    init_logging(&config.logging)?;

    info!("=== Paddy Inference Service v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Loading class mappings and models...");

    let state = match build_state(&config) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(e).context("Model initialization failed");
        }
    };

    run_server(&config.server, state).await
}
