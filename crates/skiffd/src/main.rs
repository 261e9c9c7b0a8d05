//! skiffd — ephemeral peer-sharing relay daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use skiff_core::SkiffConfig;
use skiff_services::{Janitor, PathLocks, SessionStore, UploadEngine};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "skiffd=info,skiff_api=info,skiff_services=info,tower_http=info".into()
            }),
        )
        .init();

    let config = Arc::new(SkiffConfig::load().context("failed to load configuration")?);
    tracing::info!(
        addr = %config.network.listen_addr(),
        temp_dir = %config.storage.temp_dir.display(),
        "skiffd starting"
    );

    tokio::fs::create_dir_all(&config.storage.temp_dir)
        .await
        .context("failed to create temp directory")?;

    let sessions = SessionStore::new(&config.storage.temp_dir);
    let engine = Arc::new(UploadEngine::new(
        sessions.clone(),
        PathLocks::new(),
        &config.storage,
    ));

    // Shutdown fan-out — the janitor subscribes, ctrl-c publishes.
    let (shutdown_tx, _) = broadcast::channel(1);
    let janitor = Janitor::new(sessions.clone(), config.janitor.clone());
    let janitor_task = tokio::spawn(janitor.run(shutdown_tx.subscribe()));

    let listener = tokio::net::TcpListener::bind(config.network.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.network.listen_addr()))?;

    tokio::select! {
        result = skiff_api::serve(listener, sessions, engine, config) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = janitor_task.await;
    Ok(())
}
