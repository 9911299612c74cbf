//! Telegram Bot API notification provider.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::NotificationProvider;

/// Sends messages to a Telegram chat via the Bot API
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

/// Response envelope from the Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }
}

#[async_trait]
impl NotificationProvider for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &str) -> Result<()> {
        let url = self.api_url("sendMessage");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let result: TelegramResponse = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }

        Ok(())
    }
}
