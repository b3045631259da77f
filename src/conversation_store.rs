//! # Conversation Store Module
//!
//! Process-wide map from chat id to conversation state. Each conversation sits
//! behind its own async mutex so events of one chat are applied one at a time,
//! in receipt order, while different chats proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::dialogue::Conversation;

/// Shared handle to one chat's conversation
pub type ConversationHandle = Arc<AsyncMutex<Conversation>>;

struct Entry {
    conversation: ConversationHandle,
    last_seen: Instant,
}

/// Bounded, TTL-evicting conversation store
///
/// # Lifecycle
///
/// - A conversation is created on the first event of an unseen chat
/// - Every `acquire` refreshes its last-seen time
/// - Idle conversations are dropped by `evict_expired` once the TTL elapses
/// - When the store is full, the least recently seen conversation makes room
///
/// # Thread Safety
///
/// The map itself is guarded by a short-lived std mutex that is never held
/// across an await; per-conversation serialization uses tokio's FIFO mutex.
pub struct ConversationStore {
    entries: Mutex<HashMap<i64, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl ConversationStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Get or create the conversation of `chat_id`
    pub fn acquire(&self, chat_id: i64) -> ConversationHandle {
        self.acquire_at(chat_id, Instant::now())
    }

    /// `acquire` with an explicit clock reading
    pub fn acquire_at(&self, chat_id: i64, now: Instant) -> ConversationHandle {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = entries.get_mut(&chat_id) {
            entry.last_seen = now;
            return Arc::clone(&entry.conversation);
        }

        if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                debug!(chat_id = oldest, "Evicted least recently seen conversation");
            }
        }

        debug!(chat_id, "Creating conversation");
        let conversation = Arc::new(AsyncMutex::new(Conversation::new(chat_id)));
        entries.insert(
            chat_id,
            Entry {
                conversation: Arc::clone(&conversation),
                last_seen: now,
            },
        );
        conversation
    }

    /// Drop one conversation; returns whether it existed
    pub fn evict(&self, chat_id: i64) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&chat_id).is_some()
    }

    /// Drop every conversation idle for longer than the TTL
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(Instant::now())
    }

    /// `evict_expired` with an explicit clock reading
    pub fn evict_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            info!(evicted, remaining = entries.len(), "Evicted idle conversations");
        }
        evicted
    }

    /// Number of live conversations
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, chat_id: i64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&chat_id)
    }
}
