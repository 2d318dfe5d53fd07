pub mod telegram;

use async_trait::async_trait;

/// Outbound chat delivery. Fire-and-forget from the dialogue engine's point
/// of view; failures are logged by the caller, never surfaced to the user.
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()>;
}
