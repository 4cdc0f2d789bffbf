//! HTTP server for relayd

use crate::formatter::ActivityFormatter;
use crate::metrics::DispatchMetrics;
use crate::orchestrator::Dispatcher;
use crate::routes;
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Maximum request body size: 64 KiB
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Application state shared across handlers
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub formatter: ActivityFormatter,
    pub metrics: DispatchMetrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, formatter: ActivityFormatter, metrics: DispatchMetrics) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            formatter,
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// Build the full router with middleware
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::dispatch_routes())
        .merge(routes::health_routes())
        .merge(routes::metrics_routes())
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C
pub async fn run(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = app(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("  Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down gracefully");
}
