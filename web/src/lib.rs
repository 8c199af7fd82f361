use log::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use middleware::rate_limit::{self, RateLimitState};

pub use self::error::Error;
pub use service::AppState;

mod controller;
mod error;
mod middleware;
mod params;
mod push;
pub mod router;

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Serves the relay's HTTP and WebSocket endpoints until Ctrl-C.
pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let config = app_state.config.clone();

    let rate_limits = Arc::new(RateLimitState::new(config.rate_limit_per_minute));
    if config.rate_limiting_enabled() {
        info!(
            "Rate limiting to {} requests per minute per client",
            config.rate_limit_per_minute
        );
        rate_limit::spawn_cleanup(Arc::clone(&rate_limits), RATE_LIMIT_CLEANUP_INTERVAL);
    }

    let app = router::define_routes(app_state, rate_limits);

    let listener = TcpListener::bind((config.interface(), config.port)).await?;
    info!("Server starting... listening for connections on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for the shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server");
}
