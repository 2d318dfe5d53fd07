use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::services::dialogue;
use crate::state::AppState;

/// Inbound Telegram webhook. The update is acknowledged immediately and the
/// turn runs in the background; Telegram retries the webhook if we block.
pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    Json(update): Json<Value>,
) -> Json<Value> {
    let Some((chat_id, text)) = parse_update(&update) else {
        tracing::debug!("ignoring non-text telegram update");
        return Json(json!({ "status": "ok, ignorado" }));
    };

    tracing::info!(chat = %chat_id, "incoming telegram message");

    let state = Arc::clone(&state);
    tokio::spawn(async move {
        let reply = match dialogue::process_message(&state, &chat_id, &text).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, chat = %chat_id, "turn processing failed");
                dialogue::REPLY_INTERNAL_ERROR.to_string()
            }
        };

        // Fire-and-forget delivery.
        if let Err(e) = state.messaging.send_message(&chat_id, &reply).await {
            tracing::error!(error = %e, chat = %chat_id, "failed to deliver telegram reply");
        }
    });

    Json(json!({ "status": "ok" }))
}

/// Extracts (chat id, text) from a raw Telegram update; None means the
/// update is not a text message and the webhook no-ops.
fn parse_update(update: &Value) -> Option<(String, String)> {
    let message = update.get("message")?;
    let text = message.get("text")?.as_str()?.to_string();

    let chat_id = match message.get("chat")?.get("id")? {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };

    Some((chat_id, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_update() {
        let update = json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": { "id": 123456789, "type": "private" },
                "text": "quero marcar cardiologia"
            }
        });
        assert_eq!(
            parse_update(&update),
            Some(("123456789".to_string(), "quero marcar cardiologia".to_string()))
        );
    }

    #[test]
    fn test_parse_non_text_update_is_none() {
        let update = json!({
            "update_id": 11,
            "message": {
                "message_id": 2,
                "chat": { "id": 123456789 },
                "sticker": { "file_id": "abc" }
            }
        });
        assert_eq!(parse_update(&update), None);

        let update = json!({ "update_id": 12, "edited_message": {} });
        assert_eq!(parse_update(&update), None);
    }
}
