//! Prometheus scrape endpoint
//!
//! `GET /metrics` renders the shared collector in Prometheus text format,
//! `GET /health` answers `ok`.

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use janus_tracer_core::SharedMetrics;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.to_prometheus(),
    )
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Serve the metrics endpoint on `listener` until the process exits
pub async fn serve(listener: TcpListener, metrics: SharedMetrics) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Metrics endpoint listening on http://{}/metrics", addr);
    }
    axum::serve(listener, router(metrics)).await
}

/// Log a metrics snapshot every `interval`; a zero interval disables it
pub async fn log_snapshots(metrics: SharedMetrics, interval: Duration) {
    if interval.is_zero() {
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        info!("Metrics: {}", metrics.to_json());
    }
}
