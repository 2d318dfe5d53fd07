use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::MessagingProvider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct TelegramProvider {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramProvider {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingProvider for TelegramProvider {
    async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        if self.bot_token.is_empty() {
            anyhow::bail!("TELEGRAM_BOT_TOKEN not configured");
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);

        self.client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .context("failed to send Telegram message")?
            .error_for_status()
            .context("Telegram API returned error")?;

        Ok(())
    }
}
