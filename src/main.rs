use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use streamscribe::{
    create_router, AppState, BackendRegistry, Config, MemorySessionStore, MemoryTranscriptArchive,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "streamscribe",
    about = "Streaming transcription and post-processing service"
)]
struct Args {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/streamscribe")]
    config: String,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let bind = args
        .bind
        .unwrap_or_else(|| config.service.http.bind.clone());
    let port = args.port.unwrap_or(config.service.http.port);

    info!("{} starting", config.service.name);
    info!(
        "Pipeline: {} word threshold, {} workers, {}s completion wait",
        config.pipeline.word_threshold,
        config.pipeline.worker_pool_size,
        config.pipeline.completion_wait_secs
    );

    // No local speech engine is bundled; local-model entries require one to
    // be installed here by an embedding build.
    let registry = Arc::new(BackendRegistry::from_config(&config, None)?);
    info!("Configured languages: {:?}", registry.languages());

    let store = Arc::new(MemorySessionStore::new());
    let archive = Arc::new(MemoryTranscriptArchive::new());
    let state = AppState::new(config.pipeline.clone(), registry, store, archive);

    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, create_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
