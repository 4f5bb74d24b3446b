mod auth;
mod config;
mod dto;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use ld_infra::Orchestrator;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::api_router;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env().expect("invalid service configuration");
    let orchestrator = Orchestrator::from_env().expect("failed to configure linode orchestrator");

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        config: config.clone(),
    };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(addr = %config.listen_addr, "starting linode control plane");

    axum::serve(listener, app).await.expect("server error");
}
