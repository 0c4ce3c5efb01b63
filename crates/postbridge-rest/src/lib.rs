//! HTTP front end for the blog data layer.

pub mod error;
pub mod handlers;
pub mod tracing_init;

use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use postbridge_service::PostService;
use tower_http::trace::TraceLayer;

/// Builds the application router around a shared data layer.
pub fn build_router(service: Arc<PostService>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/api/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route("/api/stats", get(handlers::author_stats))
        .route("/api/migration/status", get(handlers::migration_status))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
