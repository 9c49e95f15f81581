//! Per-chat state store.
//!
//! One [`ChatRecord`] per chat id, created lazily on the first observed
//! message. Records are never removed for the life of the process. Every
//! mutation goes through the record's own mutex so concurrent updates to the
//! same chat are serialized while different chats proceed independently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::StateError;

/// Feature toggles a chat can switch on and off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    Clean,
    Emoji,
    AiReply,
}

impl std::fmt::Display for Toggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Clean => "clean",
            Self::Emoji => "emoji",
            Self::AiReply => "ai answers",
        };
        f.write_str(s)
    }
}

/// Ephemeral state of one chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub chat_id: i64,
    /// Sender whose messages are authoritative. Unset until the first command.
    pub owner_id: Option<i64>,
    /// Suppress every non-owner message while set.
    pub muted: bool,
    pub clean_enabled: bool,
    pub emoji_enabled: bool,
    pub ai_reply_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRecord {
    pub fn new(chat_id: i64) -> Self {
        let now = Utc::now();
        Self {
            chat_id,
            owner_id: None,
            muted: false,
            clean_enabled: false,
            emoji_enabled: false,
            ai_reply_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owner(&self, sender_id: i64) -> bool {
        self.owner_id == Some(sender_id)
    }

    pub fn toggle(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::Clean => self.clean_enabled,
            Toggle::Emoji => self.emoji_enabled,
            Toggle::AiReply => self.ai_reply_enabled,
        }
    }

    fn toggle_mut(&mut self, toggle: Toggle) -> &mut bool {
        match toggle {
            Toggle::Clean => &mut self.clean_enabled,
            Toggle::Emoji => &mut self.emoji_enabled,
            Toggle::AiReply => &mut self.ai_reply_enabled,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// In-memory authority over chat state.
#[derive(Default)]
pub struct ChatStateStore {
    chats: RwLock<HashMap<i64, Arc<Mutex<ChatRecord>>>>,
}

impl ChatStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup-or-create the shared cell for `chat_id`.
    async fn entry(&self, chat_id: i64) -> Arc<Mutex<ChatRecord>> {
        if let Some(cell) = self.chats.read().await.get(&chat_id) {
            return Arc::clone(cell);
        }
        let mut chats = self.chats.write().await;
        Arc::clone(chats.entry(chat_id).or_insert_with(|| {
            debug!(chat_id, "Creating chat record");
            Arc::new(Mutex::new(ChatRecord::new(chat_id)))
        }))
    }

    /// Current record for `chat_id`, creating a default one if needed.
    pub async fn get_or_create(&self, chat_id: i64) -> ChatRecord {
        self.entry(chat_id).await.lock().await.clone()
    }

    /// Current record without creating one.
    pub async fn get(&self, chat_id: i64) -> Option<ChatRecord> {
        let cell = self.chats.read().await.get(&chat_id).cloned()?;
        let record = cell.lock().await.clone();
        Some(record)
    }

    /// Apply `f` to the record under its per-chat lock.
    pub async fn update<F, T>(&self, chat_id: i64, f: F) -> T
    where
        F: FnOnce(&mut ChatRecord) -> T,
    {
        let cell = self.entry(chat_id).await;
        let mut record = cell.lock().await;
        let out = f(&mut record);
        record.touch();
        out
    }

    /// Bind `owner_id`, overwriting any previous owner. Returns the previous owner.
    pub async fn bind_owner(&self, chat_id: i64, owner_id: i64) -> Option<i64> {
        self.update(chat_id, |r| r.owner_id.replace(owner_id)).await
    }

    /// Set the mute flag. Returns whether the value changed.
    pub async fn set_muted(&self, chat_id: i64, muted: bool) -> bool {
        self.update(chat_id, |r| std::mem::replace(&mut r.muted, muted) != muted)
            .await
    }

    /// Set a toggle. Returns whether the value changed.
    pub async fn set_toggle(&self, chat_id: i64, toggle: Toggle, value: bool) -> bool {
        self.update(chat_id, |r| {
            std::mem::replace(r.toggle_mut(toggle), value) != value
        })
        .await
    }

    /// Set a toggle to `new` only if it currently equals `expected`.
    pub async fn compare_and_set_toggle(
        &self,
        chat_id: i64,
        toggle: Toggle,
        expected: bool,
        new: bool,
    ) -> bool {
        self.update(chat_id, |r| {
            let slot = r.toggle_mut(toggle);
            if *slot == expected {
                *slot = new;
                true
            } else {
                false
            }
        })
        .await
    }

    /// Invert a toggle. Returns the new value.
    pub async fn flip_toggle(&self, chat_id: i64, toggle: Toggle) -> bool {
        self.update(chat_id, |r| {
            let slot = r.toggle_mut(toggle);
            *slot = !*slot;
            *slot
        })
        .await
    }

    pub async fn len(&self) -> usize {
        self.chats.read().await.len()
    }

    /// Copy of every record, ordered by chat id.
    pub async fn snapshot(&self) -> Vec<ChatRecord> {
        let cells: Vec<Arc<Mutex<ChatRecord>>> =
            self.chats.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(cells.len());
        for cell in cells {
            records.push(cell.lock().await.clone());
        }
        records.sort_by_key(|r| r.chat_id);
        records
    }

    /// Replace the store contents with `records`.
    pub async fn restore(&self, records: Vec<ChatRecord>) {
        let mut chats = self.chats.write().await;
        chats.clear();
        for record in records {
            chats.insert(record.chat_id, Arc::new(Mutex::new(record)));
        }
    }

    /// Write all records as JSON. Writes to a sibling temp file then renames.
    pub async fn save_snapshot(&self, path: &Path) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(&self.snapshot().await)?;
        let tmp = path.with_extension("tmp");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Build a store from a snapshot file.
    pub async fn load_snapshot(path: &Path) -> Result<Self, StateError> {
        let bytes = tokio::fs::read(path).await?;
        let records: Vec<ChatRecord> = serde_json::from_slice(&bytes)?;
        let store = Self::new();
        store.restore(records).await;
        Ok(store)
    }
}
