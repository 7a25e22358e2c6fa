//! Web server module: the JSON API the UI layer talks to.

mod handlers;

use crate::config::ServerConfig;
use crate::probe::HttpFetcher;
use crate::scheduler::ObserverContext;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// The observer as wired for the real network.
pub type Observer = ObserverContext<HttpFetcher>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub observer: Arc<Observer>,
}

/// Web server for downtally.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, observer: Arc<Observer>) -> Self {
        Self {
            state: AppState { config, observer },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

        Router::new()
            .route("/api/status", get(handlers::handle_status))
            .route("/api/history", get(handlers::handle_history))
            .route("/api/export", get(handlers::handle_export))
            .route("/api/import", post(handlers::handle_import))
            .route("/api/check", post(handlers::handle_check))
            .route("/api/increment", post(handlers::handle_increment))
            .route(
                "/api/config",
                get(handlers::handle_get_config).put(handlers::handle_update_config),
            )
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
