//! HTTP trigger surface for simplea2a.
//!
//! Inbound triggers create tasks here and poll them for results. Task
//! execution itself happens on the scheduler; every handler returns as soon
//! as the store has answered.
//!
//! Built on Axum.

pub mod api_v1;

use axum::{Router, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use simplea2a_agent::Orchestrator;
use simplea2a_config::GatewayConfig;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
}

impl GatewayState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(state))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve the gateway until the listener fails.
pub async fn start(
    config: &GatewayConfig,
    state: SharedState,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}
