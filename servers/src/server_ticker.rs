mod ticker_logic;

use anyhow::{Context, Result};
use clap::Parser;
use lib_common::core::TickerContext;
use lib_common::ingestors::{TickerWssIngestor, WsTransport};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use ticker_logic::config::{self, Config};
use ticker_logic::logger;
use ticker_logic::routes::{self, RouteState};

#[tokio::main]
async fn main() -> Result<()> {
    // Install the crypto provider for the upstream wss connection
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    // --- Configuration and Logging ---
    let settings = config::load_config(Config::parse()).context("Failed to load configuration")?;
    logger::setup_logging(&settings).context("Failed to set up logging")?;
    match &settings.config_file {
        Some(path) => log::info!("Configuration merged from {:?}", path),
        None => log::info!("No configuration file found, using defaults, environment and CLI"),
    }
    log::info!("Tracking symbols: {}", settings.symbols.join(","));

    let ctx = Arc::new(TickerContext::new(settings.symbols.clone()).context("Invalid symbol list")?);

    // --- Upstream: connect, resolve static fields, subscribe ---
    let transport = WsTransport::connect(&settings.ws_url)
        .await
        .context("Failed to connect to exchange")?;
    let mut ingestor = TickerWssIngestor::new(transport, Arc::clone(&ctx));
    if let Err(e) = ingestor.initialize().await {
        ingestor.into_transport().close().await;
        return Err(e).context("Failed to resolve symbol metadata");
    }
    ingestor.subscribe_all().await.context("Failed to subscribe to tickers")?;

    // Create a broadcast channel for shutdown signals
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let upstream_handle = tokio::spawn(ingestor.run(shutdown_tx.subscribe()));

    // --- Downstream: HTTP server ---
    let listener = TcpListener::bind((settings.hostname.as_str(), settings.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", settings.hostname, settings.port))?;
    log::info!("Server listening on host {}, port {}", settings.hostname, settings.port);

    let app = routes::router(RouteState::new(Arc::clone(&ctx), settings.stale_after));
    let mut server_shutdown = shutdown_tx.subscribe();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {
            log::info!("Shutdown signal received, stopping...");
        },
        res = &mut server_handle => {
            let _ = shutdown_tx.send(());
            return match res {
                Ok(Ok(())) => Err(anyhow::anyhow!("HTTP server stopped unexpectedly")),
                Ok(Err(e)) => Err(e).context("HTTP server failed"),
                Err(e) => Err(e).context("HTTP server task panicked"),
            };
        },
    }

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(settings.shutdown_grace, &mut server_handle).await {
        Ok(Ok(Ok(()))) => log::info!("HTTP server drained."),
        Ok(Ok(Err(e))) => log::error!("HTTP server error during shutdown: {}", e),
        Ok(Err(e)) => log::error!("HTTP server task failed: {}", e),
        Err(_) => {
            log::warn!("HTTP server did not drain within {:?}, aborting.", settings.shutdown_grace);
            server_handle.abort();
        }
    }

    match upstream_handle.await {
        Ok(Ok(())) => log::info!("Ticker feed stopped."),
        Ok(Err(e)) => log::warn!("Ticker feed had already stopped: {}", e),
        Err(e) => log::error!("Ticker feed task failed: {}", e),
    }

    log::info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
