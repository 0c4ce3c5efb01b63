use std::sync::Arc;

use axum::{extract::State, Json};
use postbridge_service::{PostService, ServiceStatus};

/// Phase, backend connectivity and post counts. Always 200; an unreachable
/// backend shows up as disconnected.
pub async fn migration_status(State(service): State<Arc<PostService>>) -> Json<ServiceStatus> {
    Json(service.status().await)
}
