//! Token screener - discovery and ranking engine
//!
//! Main entry point for the screener service

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info};

use screener_engine::{init_logging, DiscoveryEngine, Settings};
use screener_enrichment::HttpPriceOracle;
use screener_feed::{FeedSource, HttpFeedSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_logging();

    info!("Starting token screener v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        "Configured {} feed sources at {}",
        settings.feeds.sources.len(),
        settings.feeds.base_url
    );

    let fetch_timeout = Duration::from_millis(settings.engine.aggregator.fetch_timeout_ms);
    let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;

    let sources: Vec<Arc<dyn FeedSource>> = settings
        .feeds
        .sources
        .iter()
        .map(|name| {
            Arc::new(HttpFeedSource::new(
                name.clone(),
                settings.feeds.base_url.clone(),
                client.clone(),
            )) as Arc<dyn FeedSource>
        })
        .collect();

    let oracle = Arc::new(HttpPriceOracle::new(
        settings.oracle.base_url.clone(),
        Duration::from_millis(settings.engine.enrichment.fetch_timeout_ms),
    )?);

    let engine = Arc::new(DiscoveryEngine::new(settings.engine, sources, oracle));

    // Setup shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = shutdown_tx.send(());
    });

    // Log emitted deltas so a headless run is observable
    let mut deltas = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match deltas.recv().await {
                Ok(delta) => {
                    info!(
                        "Delta: {} entities changed (page info changed: {})",
                        delta.changed.len(),
                        delta.page_info_changed
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    error!("Delta consumer lagged, skipped {}", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("Press Ctrl+C to shutdown");
    engine.run(shutdown_rx).await;

    info!("Engine shutdown complete");
    Ok(())
}
