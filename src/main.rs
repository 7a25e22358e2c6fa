//! downtally - outage counter for a single endpoint.
//!
//! Probes one URL on a schedule, falling back through relays when the direct
//! request fails, and counts each distinct outage once.

mod config;
mod db;
mod probe;
mod scheduler;
mod web;

use config::ServerConfig;
use db::Store;
use probe::HttpFetcher;
use scheduler::{HistoryAggregator, ObserverContext, Scheduler};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("downtally=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting downtally on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let observer = Arc::new(ObserverContext::new(
        store,
        HttpFetcher::new()?,
        HistoryAggregator::new(cfg.history_mode),
        cfg.probe_defaults(),
        cfg.attempt_timeout,
    ));

    let settings = observer.settings()?;
    tracing::info!(
        "Probing {} every {:?} ({:?} history)",
        settings.target_url,
        cfg.poll_interval,
        cfg.history_mode
    );

    // Start scheduler
    let scheduler = Scheduler::new(observer.clone(), cfg.poll_interval);
    scheduler.start().await;

    // Start web server
    let server = Server::new(cfg, observer);
    server.start().await?;

    scheduler.stop().await;
    Ok(())
}
