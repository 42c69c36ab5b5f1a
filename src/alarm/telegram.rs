use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::AlertSender;
use crate::config::TelegramConfig;
use crate::error::{AlertSendError, ConfigError};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Delivers alerts through the Telegram Bot API `sendMessage` method
pub struct TelegramSender {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramSender {
    pub fn from_config(config: &TelegramConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl AlertSender for TelegramSender {
    async fn send(&self, text: &str) -> Result<(), AlertSendError> {
        debug!("Posting alert to Telegram chat {}", self.chat_id);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| AlertSendError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(AlertSendError::Rejected(format!("{}: {}", status, body)))
        }
    }
}
