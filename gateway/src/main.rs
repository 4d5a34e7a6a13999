//! Review gateway: polls App Store review feeds and serves them over HTTP.
//!
//! Startup: load the mirror file, start the poller, serve the read API.
//! Shutdown (Ctrl-C / SIGTERM): stop the poller, persist the store, then
//! drain the HTTP server.

use anyhow::{Context, Result};
use clap::Parser;
use common::config::AppsConfig;
use common::store::ReviewStore;
use poller::{ItunesFetcher, Poller};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

mod api;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// JSON file listing the app ids to poll.
    #[arg(long, default_value = "config/apps.json")]
    config: PathBuf,
    /// Review mirror file.
    #[arg(long, default_value = "data/reviews.json")]
    data: PathBuf,
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_secs: u64,
    #[arg(long, default_value = poller::fetcher::ITUNES_BASE_URL)]
    feed_base_url: String,
    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gateway=info,poller=info,common=info,tower_http=info".into());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    info!("Starting App Store review poller v{}", env!("CARGO_PKG_VERSION"));

    // ── Store ───────────────────────────────────────────────────────
    let store = Arc::new(ReviewStore::new(&args.data).context("Failed to create review store")?);
    match store.load_from_disk() {
        Ok(()) => info!(reviews = store.len(), "Loaded existing review data"),
        Err(e) => {
            warn!("Failed to load existing state: {}", e);
            warn!("Starting with empty state");
        }
    }

    // ── Poller ──────────────────────────────────────────────────────
    let config = AppsConfig::load(&args.config).context("Failed to load apps config")?;
    if config.apps.is_empty() {
        warn!(config = %args.config.display(), "No apps configured; poller will idle");
    }

    let fetcher = ItunesFetcher::with_base_url(&args.feed_base_url)?;
    let review_poller = Poller::new(
        store.clone(),
        Arc::new(fetcher),
        config.apps,
        Duration::from_secs(args.poll_interval_secs),
    );
    review_poller.start().await;

    // ── HTTP API ────────────────────────────────────────────────────
    let app = api::router(api::AppState {
        store: store.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received, cleaning up...");

    info!("Stopping poller...");
    review_poller.stop().await;

    info!("Saving final state...");
    if let Err(e) = store.persist_now() {
        error!("Error saving state: {}", e);
    }

    let _ = drain_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("Server error: {}", e),
        Ok(Err(e)) => error!("Server task failed: {}", e),
        Err(_) => warn!("HTTP server did not drain within {:?}", SHUTDOWN_GRACE),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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
