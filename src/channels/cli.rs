//! CLI messenger: stdin/stdout rehearsal of choreographies.
//!
//! Each stdin line is an inbound event in a single local chat. A line of the
//! form `@<id> text` is sent as user `<id>`; anything else comes from
//! [`LOCAL_USER_ID`]. Outbound sends, edits and deletes are printed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{ChatTarget, EventStream, InboundEvent, MessageHandle, Messenger};
use crate::error::ChannelError;

/// Chat id of the single local chat.
pub const LOCAL_CHAT_ID: i64 = 1;

/// Sender id used for lines without an `@<id>` prefix.
pub const LOCAL_USER_ID: i64 = 1000;

/// A CLI messenger that reads from stdin and writes to stdout.
pub struct CliChannel {
    next_id: Arc<AtomicI64>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Split an optional `@<id> ` sender prefix off a line.
fn parse_line(line: &str) -> (i64, &str) {
    if let Some(rest) = line.strip_prefix('@') {
        if let Some((id, text)) = rest.split_once(' ') {
            if let Ok(id) = id.parse::<i64>() {
                return (id, text.trim());
            }
        }
    }
    (LOCAL_USER_ID, line)
}

#[async_trait]
impl Messenger for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let next_id = Arc::clone(&self.next_id);

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let (sender_id, text) = parse_line(line);
                        let message_id = next_id.fetch_add(1, Ordering::SeqCst);
                        let ev = InboundEvent::new(LOCAL_CHAT_ID, sender_id, message_id, text);
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|ev| (ev, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_message(
        &self,
        chat: &ChatTarget,
        text: &str,
    ) -> Result<MessageHandle, ChannelError> {
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        println!("[send #{message_id}] {text}");
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
        println!("[edit #{}] {text}", handle.message_id);
        Ok(())
    }

    async fn delete_messages(
        &self,
        _chat: &ChatTarget,
        message_ids: &[i64],
    ) -> Result<(), ChannelError> {
        let ids: Vec<String> = message_ids.iter().map(|id| format!("#{id}")).collect();
        println!("[delete {}]", ids.join(", "));
        Ok(())
    }
}
