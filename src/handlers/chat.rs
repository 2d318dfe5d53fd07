use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::services::dialogue;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub session_id: String,
}

/// Synchronous web entry point. A stateless client keeps its session by
/// echoing the returned session_id back on the next request; that id is the
/// conversation key for all memory purposes.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if payload.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::info!(session = %id, "new web session");
            id
        });

    let reply = match dialogue::process_message(&state, &session_id, &payload.message).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, session = %session_id, "turn processing failed");
            dialogue::REPLY_INTERNAL_ERROR.to_string()
        }
    };

    Ok(Json(ChatResponse { reply, session_id }))
}
