//! Telegram messenger: long-polls the Bot API for updates.
//!
//! Native Rust Telegram Bot API client exposing exactly what the core needs:
//! send, edit and delete of text messages, plus an inbound event stream that
//! covers both ordinary and business-delegated chats.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::channels::{ChatTarget, EventStream, InboundEvent, MessageHandle, Messenger};
use crate::error::ChannelError;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram messenger: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.bot_token, method)
    }

    /// POST a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method}: {e}")))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::InvalidMessage(format!("{method}: {e}")))?;

        if status.as_u16() == 429 {
            let retry_after = data
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(Value::as_u64)
                .map(Duration::from_secs);
            return Err(ChannelError::RateLimited {
                name: "telegram".into(),
                retry_after,
            });
        }

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(ChannelError::Http(format!(
                "{method} returned {status}: {description}"
            )));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }
}

fn api_url(token: &SecretString, method: &str) -> String {
    format!(
        "https://api.telegram.org/bot{}/{method}",
        token.expose_secret()
    )
}

/// Long-poll getUpdates and forward parsed events until the receiver is gone.
async fn poll_updates(
    client: reqwest::Client,
    url: String,
    tx: tokio::sync::mpsc::UnboundedSender<InboundEvent>,
) {
    let mut offset: i64 = 0;

    tracing::info!("Telegram channel listening for messages...");

    loop {
        if tx.is_closed() {
            tracing::info!("Telegram listener channel closed");
            return;
        }

        let body = serde_json::json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message", "business_message"]
        });

        let resp = match client.post(&url).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Telegram poll error: {e}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        let data: Value = match resp.json().await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Telegram parse error: {e}");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        let Some(results) = data.get("result").and_then(Value::as_array) else {
            tracing::warn!(response = %data, "Telegram getUpdates returned no result");
            tokio::time::sleep(POLL_RETRY_DELAY).await;
            continue;
        };

        for update in results {
            // Advance offset past this update
            if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                offset = uid + 1;
            }

            let Some(event) = parse_update(update) else {
                continue;
            };

            if tx.send(event).is_err() {
                tracing::info!("Telegram listener channel closed");
                return;
            }
        }
    }
}

// ── Messenger trait implementation ──────────────────────────────────

#[async_trait]
impl Messenger for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let url = self.api_url("getUpdates");
        let client = self.client.clone();

        tokio::spawn(poll_updates(client, url, tx));

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ev| (ev, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        chat: &ChatTarget,
        text: &str,
    ) -> Result<MessageHandle, ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat.chat_id,
            "text": text,
        });
        if let Some(ref bcid) = chat.business_connection_id {
            body["business_connection_id"] = Value::String(bcid.clone());
        }

        let result = self.call("sendMessage", &body).await.map_err(|e| match e {
            ChannelError::RateLimited { .. } => e,
            other => ChannelError::SendFailed {
                name: "telegram".into(),
                reason: other.to_string(),
            },
        })?;

        let message_id = result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| ChannelError::InvalidMessage("sendMessage: no message_id".into()))?;

        Ok(MessageHandle {
            chat: chat.clone(),
            message_id,
        })
    }

    async fn edit_message_text(
        &self,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": handle.chat.chat_id,
            "message_id": handle.message_id,
            "text": text,
        });
        if let Some(ref bcid) = handle.chat.business_connection_id {
            body["business_connection_id"] = Value::String(bcid.clone());
        }

        self.call("editMessageText", &body)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ChannelError::RateLimited { .. } => e,
                other => ChannelError::EditFailed {
                    name: "telegram".into(),
                    reason: other.to_string(),
                },
            })
    }

    async fn delete_messages(
        &self,
        chat: &ChatTarget,
        message_ids: &[i64],
    ) -> Result<(), ChannelError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        // deleteMessages does not take a business connection id; the bot's own
        // messages and permitted user messages are deleted by chat id alone.
        let body = serde_json::json!({
            "chat_id": chat.chat_id,
            "message_ids": message_ids,
        });

        self.call("deleteMessages", &body)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ChannelError::RateLimited { .. } => e,
                other => ChannelError::DeleteFailed {
                    name: "telegram".into(),
                    reason: other.to_string(),
                },
            })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn one getUpdates entry into an inbound event.
///
/// Accepts `message` and `business_message` updates. Messages without a
/// sender are dropped; messages without text are kept (`text: None`) so mute
/// suppression also covers stickers and media.
pub fn parse_update(update: &Value) -> Option<InboundEvent> {
    let message = update
        .get("message")
        .or_else(|| update.get("business_message"))?;

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?;
    let sender_id = message
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64)?;
    let message_id = message.get("message_id").and_then(Value::as_i64)?;

    let mut chat = ChatTarget::new(chat_id);
    if let Some(bcid) = message.get("business_connection_id").and_then(Value::as_str) {
        chat = chat.with_business_connection(bcid);
    }

    Some(InboundEvent {
        chat,
        sender_id,
        message_id,
        text: message.get("text").and_then(Value::as_str).map(String::from),
        reply_to_message_id: message
            .get("reply_to_message")
            .and_then(|r| r.get("message_id"))
            .and_then(Value::as_i64),
    })
}

// ── Tests ───────────────────────────────────────────────────────────
