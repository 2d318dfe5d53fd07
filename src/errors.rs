use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// HTTP-surface errors. Dialogue-level failures never reach this type;
/// they become fixed fallback replies with a 200 so the conversation
/// keeps flowing.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
