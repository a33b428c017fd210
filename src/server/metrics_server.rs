// src/server/metrics_server.rs

//! A minimal HTTP server exposing `/metrics` in Prometheus text format.
//! `core::metrics` only registers counters/gauges that are already kept
//! current by the fan-out engine, so there is nothing to refresh before
//! gathering.

use crate::core::metrics::gather_metrics;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use tokio::sync::broadcast;
use tracing::{error, info};

async fn metrics_handler() -> impl IntoResponse {
    let body = gather_metrics();
    (StatusCode::OK, [("content-type", "text/plain; version=0.0.4")], body)
}

/// Runs the metrics server until `shutdown_rx` fires. Errors binding the
/// port are logged, not propagated: metrics are diagnostic, not load-bearing
/// for the control service's correctness.
pub async fn run(port: u16, mut shutdown_rx: broadcast::Receiver<()>) {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Prometheus metrics server listening on http://{addr}/metrics");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind metrics server on port {port}: {e}");
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("metrics server shutting down");
        })
        .await
        .ok();
}
