//! Mapping of service errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use postbridge_core::CoreError;
use serde_json::json;
use thiserror::Error;

/// Error returned by every JSON handler. Renders as `{"error": message}`.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub CoreError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(CoreError::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use postbridge_core::Backend;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let unavailable = ApiError(CoreError::unavailable(Backend::Cassandra, "down"));
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError(CoreError::Storage("boom".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
