mod ai;
mod api;
mod config;
mod error;
mod validation;

use anyhow::Context;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use api::collab::CollabApiState;
use config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::load().context("failed to load server configuration")?;
    let state = CollabApiState::from_config(&config);
    if !state.has_provider() {
        warn!(
            "no provider credential configured; collaboration requests will return a setup message"
        );
    }

    let app = build_router(state);
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(listen_addr = %config.listen_addr, model = %config.model, "starting marginalia server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")
}

fn build_router(state: CollabApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(api::collab::router(state))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(request_id_middleware))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Echo or generate an `x-request-id` and keep it in scope for error
/// envelopes produced while handling the request.
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = error::request_id_from_headers_or_generate(request.headers());
    let mut response =
        error::with_request_id_scope(request_id.clone(), next.run(request)).await;
    error::attach_request_id_header(&mut response, &request_id);
    response
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
