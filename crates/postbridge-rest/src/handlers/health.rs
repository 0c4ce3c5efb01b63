//! Liveness and metrics endpoints.
//!
//! - `GET /health` - process is up; does not touch the backends
//! - `GET /metrics` - Prometheus text exposition

use axum::{http::header, response::IntoResponse};

pub async fn health_handler() -> &'static str {
    "ok"
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        postbridge_service::metrics::export_prometheus(),
    )
}
