//! Per-sender conversation state: rolling message history and menu catalog.
//!
//! Conversations are keyed by sender id and created lazily on first reference. Each one sits
//! behind its own async mutex so turns from the same sender are applied one at a time while
//! different senders proceed independently.

use crate::catalog::CatalogItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Default cap on stored turns per sender.
pub const DEFAULT_MAX_STORED_TURNS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// History and catalog for one sender.
#[derive(Debug, Clone)]
pub struct Conversation {
    history: Vec<Turn>,
    catalog: Vec<CatalogItem>,
    max_stored_turns: usize,
}

impl Conversation {
    fn new(max_stored_turns: usize) -> Self {
        Self {
            history: Vec::new(),
            catalog: Vec::new(),
            max_stored_turns: max_stored_turns.max(1),
        }
    }

    /// Append a turn, dropping the oldest ones beyond the storage cap.
    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
        if self.history.len() > self.max_stored_turns {
            let excess = self.history.len() - self.max_stored_turns;
            self.history.drain(..excess);
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The last `n` turns, oldest first.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn catalog(&self) -> &[CatalogItem] {
        &self.catalog
    }

    pub fn add_item(&mut self, item: CatalogItem) {
        self.catalog.push(item);
    }
}

/// In-memory conversation store shared by the gateway and processors.
/// Outcome of [`ConversationStore::peek`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peek<T> {
    Unknown,
    /// A turn for this sender holds the conversation.
    Busy,
    Ready(T),
}

pub struct ConversationStore {
    inner: RwLock<HashMap<String, Arc<Mutex<Conversation>>>>,
    max_stored_turns: usize,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STORED_TURNS)
    }
}

impl ConversationStore {
    pub fn new(max_stored_turns: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            max_stored_turns,
        }
    }

    /// Conversation for `sender_id`, created empty if absent.
    pub async fn get_or_create(&self, sender_id: &str) -> Arc<Mutex<Conversation>> {
        if let Some(conv) = self.inner.read().await.get(sender_id) {
            return conv.clone();
        }
        let mut g = self.inner.write().await;
        g.entry(sender_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(self.max_stored_turns))))
            .clone()
    }

    /// Conversation for `sender_id` if one exists. Does not create.
    pub async fn get(&self, sender_id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.inner.read().await.get(sender_id).cloned()
    }

    /// Copy of a sender's history, if the sender is known.
    pub async fn history(&self, sender_id: &str) -> Option<Vec<Turn>> {
        let conv = self.get(sender_id).await?;
        let g = conv.lock().await;
        Some(g.history().to_vec())
    }

    /// Copy of a sender's catalog, if the sender is known.
    pub async fn catalog(&self, sender_id: &str) -> Option<Vec<CatalogItem>> {
        let conv = self.get(sender_id).await?;
        let g = conv.lock().await;
        Some(g.catalog().to_vec())
    }

    /// Read a sender's conversation without waiting for a turn in progress.
    pub async fn peek<T, F>(&self, sender_id: &str, read: F) -> Peek<T>
    where
        F: FnOnce(&Conversation) -> T,
    {
        let Some(conv) = self.get(sender_id).await else {
            return Peek::Unknown;
        };
        let Ok(g) = conv.try_lock() else {
            return Peek::Busy;
        };
        Peek::Ready(read(&*g))
    }

    /// Number of known senders.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
