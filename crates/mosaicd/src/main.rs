//! mosaicd: Mosaic file store node.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use mosaic_core::config::MosaicConfig;
use mosaic_core::Node;
use mosaic_services::{MosaicNode, NodeSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = MosaicConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = MosaicConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        MosaicConfig::default()
    });

    let mut settings = NodeSettings::from_config(&config).context("invalid peer list")?;

    // Optional positional override of the listen address.
    if let Some(arg) = std::env::args().nth(1) {
        settings.local = arg
            .parse::<Node>()
            .with_context(|| format!("invalid listen address {arg:?}"))?;
    }

    tracing::info!(
        node = %settings.local,
        peers = settings.peers.len(),
        chunk_size = settings.chunk_size,
        max_concurrent_pulls = settings.max_concurrent_pulls,
        "mosaicd starting"
    );

    let node = Arc::new(MosaicNode::new(settings));

    // ── Startup import ───────────────────────────────────────────────────────
    let import_dir = &config.storage.import_dir;
    if !import_dir.as_os_str().is_empty() {
        match node.import_dir(import_dir).await {
            Ok(count) => tracing::info!(dir = %import_dir.display(), count, "startup import done"),
            Err(e) => tracing::warn!(dir = %import_dir.display(), error = %e, "startup import failed"),
        }
    }

    let local = node.local().clone();
    let listener = TcpListener::bind((local.host.as_str(), local.port))
        .await
        .with_context(|| format!("binding {local}"))?;

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────
    let server_task = {
        let node = node.clone();
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = node.serve(listener, shutdown).await {
                tracing::error!(error = %e, "server failed");
            }
        })
    };

    let stats_printer = {
        let node = node.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let catalog = node.catalog();
                tracing::info!(
                    files = catalog.len(),
                    bytes = catalog.size(),
                    duplicates = catalog.duplicate_count(),
                    peers = node.peers().peers(node.local()).len(),
                    "catalog stats"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = server_task        => tracing::error!("server task exited: {:?}", r),
        r = stats_printer      => tracing::error!("stats printer exited: {:?}", r),
    }

    Ok(())
}
