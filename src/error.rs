use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or unusable request input, e.g. an unknown track.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    ModelUnavailable(String),
    #[error("{0}")]
    UpstreamData(String),
    #[error("Run not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            // prediction-path errors are reported in the body, not the status line
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": self.to_string() }))).into_response()
            }
            other => (other.status(), Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
