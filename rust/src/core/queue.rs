// Message queue store: locally originated messages not yet confirmed.

use std::collections::HashMap;

use parley_transport_traits::{ConversationKey, Timestamp};

use crate::error::QueueError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueuedState {
    Pending,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedMessage {
    pub(crate) id: String,
    pub(crate) sender: String,
    pub(crate) content: String,
    pub(crate) sent_at: Timestamp,
    pub(crate) state: QueuedState,
    // Send attempt counter; completions from an earlier attempt are ignored.
    pub(crate) attempt: u32,
    pub(crate) attempted_at: Timestamp,
    // Set once the transport acknowledged the current attempt.
    pub(crate) accepted_at: Option<Timestamp>,
}

impl QueuedMessage {
    pub(crate) fn pending(
        id: String,
        sender: String,
        content: String,
        sent_at: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            sender,
            content,
            sent_at,
            state: QueuedState::Pending,
            attempt: 1,
            attempted_at: now,
            accepted_at: None,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.state, QueuedState::Pending)
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(self.state, QueuedState::Failed { .. })
    }
}

#[derive(Debug, Default)]
struct ConversationQueue {
    entries: Vec<QueuedMessage>,
    revision: u64,
}

/// Per-conversation ordered queues of pending and failed messages.
///
/// Insertion order is preserved. Entries are only ever touched by id. Every
/// effective mutation stamps the conversation with a fresh store-wide
/// revision so callers can memoize anything derived from a queue.
#[derive(Debug, Default)]
pub(crate) struct MessageQueueStore {
    queues: HashMap<ConversationKey, ConversationQueue>,
    next_revision: u64,
}

impl MessageQueueStore {
    pub(crate) fn add(
        &mut self,
        key: &ConversationKey,
        message: QueuedMessage,
    ) -> Result<(), QueueError> {
        if message.id.trim().is_empty() {
            return Err(QueueError::EmptyId);
        }
        let revision = self.bump();
        let queue = self.queues.entry(key.clone()).or_default();
        queue.entries.push(message);
        queue.revision = revision;
        Ok(())
    }

    /// Patch the entry matching `id` in place. Returns `false` when no such
    /// entry exists.
    pub(crate) fn update(
        &mut self,
        key: &ConversationKey,
        id: &str,
        patch: impl FnOnce(&mut QueuedMessage),
    ) -> bool {
        let Some(queue) = self.queues.get_mut(key) else {
            return false;
        };
        let Some(entry) = queue.entries.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        let before = entry.clone();
        patch(entry);
        if entry.id.trim().is_empty() {
            // An id is never patched away.
            entry.id = before.id.clone();
        }
        if *entry == before {
            return true;
        }
        self.next_revision += 1;
        queue.revision = self.next_revision;
        true
    }

    /// Remove the entry matching `id`. Removing an absent id is a no-op.
    pub(crate) fn remove(&mut self, key: &ConversationKey, id: &str) -> bool {
        let Some(queue) = self.queues.get_mut(key) else {
            return false;
        };
        let before = queue.entries.len();
        queue.entries.retain(|m| m.id != id);
        if queue.entries.len() == before {
            return false;
        }
        if queue.entries.is_empty() {
            self.queues.remove(key);
        } else {
            self.next_revision += 1;
            queue.revision = self.next_revision;
        }
        true
    }

    pub(crate) fn get(&self, key: &ConversationKey, id: &str) -> Option<&QueuedMessage> {
        self.entries(key).iter().find(|m| m.id == id)
    }

    pub(crate) fn contains(&self, key: &ConversationKey, id: &str) -> bool {
        self.get(key, id).is_some()
    }

    /// Ordered view of a conversation's queue.
    pub(crate) fn entries(&self, key: &ConversationKey) -> &[QueuedMessage] {
        self.queues
            .get(key)
            .map(|q| q.entries.as_slice())
            .unwrap_or(&[])
    }

    /// Immutable ordered copy of a conversation's queue.
    pub(crate) fn snapshot(&self, key: &ConversationKey) -> Vec<QueuedMessage> {
        self.entries(key).to_vec()
    }

    /// Revision of a conversation's queue. Absent queues report `0`.
    pub(crate) fn revision(&self, key: &ConversationKey) -> u64 {
        self.queues.get(key).map(|q| q.revision).unwrap_or(0)
    }

    /// Conversations with at least one queued entry.
    pub(crate) fn keys(&self) -> Vec<ConversationKey> {
        let mut keys: Vec<ConversationKey> = self.queues.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn clear(&mut self) {
        self.queues.clear();
    }

    fn bump(&mut self) -> u64 {
        self.next_revision += 1;
        self.next_revision
    }
}
