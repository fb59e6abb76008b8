//! Telegram Bot API transport.
//!
//! A plain long-polling client over `getUpdates`, plus the [`Transport`]
//! send/delete operations. Webhooks are deliberately not used; the poller
//! is a single loop that dispatches each update to the message handler.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::agent::handler::MessageHandler;
use crate::config::TelegramConfig;
use crate::error::ChannelError;

use super::{IncomingMessage, Transport};

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: Chat,
    from: Option<From>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct From {
    id: i64,
}

/// Telegram Bot API HTTP client.
pub struct TelegramClient {
    http: Client,
    api_base: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config.api_base.clone(),
            bot_token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base,
            self.bot_token.expose_secret(),
            method
        )
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;
        let envelope: ApiEnvelope<T> = response.json().await?;

        if !envelope.ok {
            return Err(ChannelError::PollFailed(
                envelope
                    .description
                    .unwrap_or_else(|| format!("{method} returned ok=false")),
            ));
        }
        envelope.result.ok_or_else(|| {
            ChannelError::PollFailed(format!("{method} returned no result payload"))
        })
    }

    /// Long-poll for updates after `offset`.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, ChannelError> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>(
            "sendMessage",
            serde_json::json!({ "chat_id": chat_id, "text": text }),
        )
        .await
        .map_err(|err| ChannelError::SendFailed {
            chat_id,
            reason: err.to_string(),
        })?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>(
            "deleteMessage",
            serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
        .map_err(|err| ChannelError::DeleteFailed {
            chat_id,
            message_id,
            reason: err.to_string(),
        })?;
        Ok(())
    }
}

/// Long-polling dispatch loop.
pub struct TelegramPoller {
    client: Arc<TelegramClient>,
    handler: Arc<MessageHandler>,
}

impl TelegramPoller {
    pub fn new(client: Arc<TelegramClient>, handler: Arc<MessageHandler>) -> Self {
        Self { client, handler }
    }

    /// Poll forever, spawning one task per inbound message. Per-user
    /// ordering is enforced inside the handler via the session store's
    /// per-user guard, so concurrent dispatch here is safe.
    pub async fn run(&self) -> Result<(), ChannelError> {
        info!("telegram poller started");
        let mut offset = 0i64;

        loop {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(%err, "polling failed, backing off");
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);

                let Some(message) = update.message else {
                    continue;
                };
                let (Some(from), Some(text)) = (message.from, message.text) else {
                    continue;
                };

                let incoming = IncomingMessage {
                    chat_id: message.chat.id,
                    user_id: from.id,
                    message_id: message.message_id,
                    text,
                };

                let handler = Arc::clone(&self.handler);
                tokio::spawn(async move {
                    if let Err(err) = handler.handle_message(incoming).await {
                        error!(%err, "message handling failed past the catch-all");
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_envelope_deserializes() {
        let raw = r#"{
            "ok": true,
            "result": [{
                "update_id": 10,
                "message": {
                    "message_id": 5,
                    "chat": { "id": 77 },
                    "from": { "id": 42 },
                    "text": "check balance"
                }
            }]
        }"#;
        let envelope: ApiEnvelope<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(envelope.ok);
        let updates = envelope.result.unwrap();
        assert_eq!(updates[0].update_id, 10);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 77);
        assert_eq!(message.text.as_deref(), Some("check balance"));
    }

    #[test]
    fn error_envelope_carries_description() {
        let raw = r#"{ "ok": false, "description": "Unauthorized" }"#;
        let envelope: ApiEnvelope<Vec<Update>> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.ok);
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));
    }
}
