use crate::http::handlers::{self, ApiState};
use anyhow::Context;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// `/leituras` is the path the lab firmware posts to; it behaves exactly like `/readings`
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/readings",
            get(handlers::list_readings).post(handlers::create_reading),
        )
        .route(
            "/leituras",
            get(handlers::list_readings).post(handlers::create_reading),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `ctx` is cancelled, then stop accepting and finish in-flight requests
pub async fn run_http_server(
    config: HttpServerConfig,
    state: ApiState,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", addr))?;

    info!(address = %addr, "HTTP server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { ctx.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped");
    Ok(())
}
