//! Messenger abstraction: the narrow interface the core talks through.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChannelError;

/// Where outbound messages for a chat go.
///
/// `business_connection_id` is set when the chat is reached through a
/// delegated business connection and must be echoed on sends and edits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatTarget {
    pub chat_id: i64,
    pub business_connection_id: Option<String>,
}

impl ChatTarget {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            business_connection_id: None,
        }
    }

    pub fn with_business_connection(mut self, id: impl Into<String>) -> Self {
        self.business_connection_id = Some(id.into());
        self
    }
}

/// Reference to a message previously sent by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat: ChatTarget,
    pub message_id: i64,
}

/// One message-received event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub chat: ChatTarget,
    pub sender_id: i64,
    pub message_id: i64,
    pub text: Option<String>,
    pub reply_to_message_id: Option<i64>,
}

impl InboundEvent {
    pub fn new(chat_id: i64, sender_id: i64, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat: ChatTarget::new(chat_id),
            sender_id,
            message_id,
            text: Some(text.into()),
            reply_to_message_id: None,
        }
    }

    pub fn with_chat(mut self, chat: ChatTarget) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }

    pub fn chat_id(&self) -> i64 {
        self.chat.chat_id
    }
}

/// Stream of inbound events, one at a time.
pub type EventStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// Messaging platform client.
///
/// Every delivery failure is a [`ChannelError`]; callers in the core treat
/// all of them as transient and continue (see [`best_effort`]).
#[async_trait]
pub trait Messenger: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving inbound events.
    async fn start(&self) -> Result<EventStream, ChannelError>;

    async fn send_message(
        &self,
        chat: &ChatTarget,
        text: &str,
    ) -> Result<MessageHandle, ChannelError>;

    async fn edit_message_text(
        &self,
        handle: &MessageHandle,
        text: &str,
    ) -> Result<(), ChannelError>;

    async fn delete_messages(
        &self,
        chat: &ChatTarget,
        message_ids: &[i64],
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Collapse a delivery result into an `Option`, logging the failure.
///
/// This is the single policy for outbound calls: a rejected send, edit or
/// delete never aborts the caller and is never retried in place.
pub fn best_effort<T>(
    operation: &str,
    chat_id: i64,
    result: Result<T, ChannelError>,
) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(chat_id, operation, error = %e, "Delivery failed; continuing");
            None
        }
    }
}
