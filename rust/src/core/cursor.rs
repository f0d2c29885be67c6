// Backward pagination cursors.

use std::collections::HashMap;

use parley_transport_traits::{ConversationKey, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CursorState {
    /// Upper bound (exclusive) of the next backward fetch. `None` means the
    /// most recent page.
    pub(crate) end_time: Option<Timestamp>,
    pub(crate) has_more: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            end_time: None,
            has_more: true,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PaginationCursorTracker {
    cursors: HashMap<ConversationKey, CursorState>,
}

impl PaginationCursorTracker {
    pub(crate) fn get(&self, key: &ConversationKey) -> CursorState {
        self.cursors.get(key).copied().unwrap_or_default()
    }

    /// Move `end_time` back to `t`. Only ever moves backwards: returns `false`
    /// and leaves the cursor alone when `t` is newer than the stored bound.
    pub(crate) fn advance(&mut self, key: &ConversationKey, t: Timestamp) -> bool {
        let cursor = self.cursors.entry(key.clone()).or_default();
        match cursor.end_time {
            Some(end) if t > end => false,
            _ => {
                cursor.end_time = Some(t);
                true
            }
        }
    }

    pub(crate) fn set_has_more(&mut self, key: &ConversationKey, has_more: bool) {
        self.cursors.entry(key.clone()).or_default().has_more = has_more;
    }

    pub(crate) fn reset(&mut self, key: &ConversationKey) {
        self.cursors.remove(key);
    }

    pub(crate) fn clear(&mut self) {
        self.cursors.clear();
    }
}
