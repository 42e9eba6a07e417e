// src/server/metrics_server.rs

//! Serves the Prometheus `/metrics` endpoint. Pure observability: it
//! updates no control-plane state.

use crate::core::metrics::gather_metrics;
use crate::core::node::NodeState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

async fn metrics_handler(state: Arc<NodeState>) -> impl IntoResponse {
    crate::core::metrics::CONNECTED_PEERS.set(state.registry.len() as f64);
    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

pub async fn run(state: Arc<NodeState>, port: u16, mut shutdown_rx: broadcast::Receiver<()>) {
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Prometheus metrics server listening on http://{addr}/metrics");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, port, "failed to bind metrics server");
            return;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("metrics server shutting down");
        })
        .await
        .unwrap();
}
