//! HTTP server for the Prometheus metrics and health endpoints.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus scraping
//! and `/health` for load balancers.

use crate::hub::Hub;
use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::net::SocketAddr;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Handler for GET /health - registry size and delivery totals.
async fn health_handler(State(hub): State<Hub>) -> Json<Value> {
    let stats = hub.stats();
    Json(json!({
        "status": "ok",
        "clients": stats.live_clients,
        "groups": stats.live_groups,
        "delivered": stats.delivered,
        "dropped": stats.dropped,
    }))
}

pub fn router(hub: Hub) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(hub)
}

/// Run the HTTP server.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16, hub: Hub) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(hub)).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
