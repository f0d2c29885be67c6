// Confirmed messages materialized for the open conversation.

use std::cmp::Ordering;
use std::collections::HashSet;

use parley_transport_traits::{ConfirmedMessage, Timestamp};

/// Most recent first, ties broken by id.
fn display_order(a: &ConfirmedMessage, b: &ConfirmedMessage) -> Ordering {
    b.sent_at.cmp(&a.sent_at).then_with(|| a.id.cmp(&b.id))
}

/// Ordered confirmed messages with an id index.
///
/// Merges only insert: an existing entry is never moved or replaced, and a
/// message whose id is already present is dropped.
#[derive(Debug, Default)]
pub(crate) struct ConfirmedSet {
    messages: Vec<ConfirmedMessage>,
    ids: HashSet<String>,
    revision: u64,
}

impl ConfirmedSet {
    pub(crate) fn insert(&mut self, message: ConfirmedMessage) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        let pos = match self
            .messages
            .binary_search_by(|probe| display_order(probe, &message))
        {
            Ok(pos) | Err(pos) => pos,
        };
        self.ids.insert(message.id.clone());
        self.messages.insert(pos, message);
        self.revision += 1;
        true
    }

    /// Insert every message not already present. Returns how many were new.
    pub(crate) fn merge(&mut self, messages: impl IntoIterator<Item = ConfirmedMessage>) -> usize {
        messages
            .into_iter()
            .filter(|m| !m.id.is_empty())
            .fold(0, |added, m| added + usize::from(self.insert(m)))
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub(crate) fn oldest_sent_at(&self) -> Option<Timestamp> {
        self.messages.last().map(|m| m.sent_at)
    }

    pub(crate) fn as_slice(&self) -> &[ConfirmedMessage] {
        &self.messages
    }

    pub(crate) fn len(&self) -> usize {
        self.messages.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, sent_at: Timestamp) -> ConfirmedMessage {
        ConfirmedMessage {
            id: id.into(),
            sender: "0xpeer".into(),
            content: id.into(),
            sent_at,
        }
    }

    fn ids(set: &ConfirmedSet) -> Vec<&str> {
        set.as_slice().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn keeps_newest_first() {
        let mut set = ConfirmedSet::default();
        set.merge(vec![msg("b", 20), msg("a", 10), msg("c", 30)]);
        assert_eq!(ids(&set), vec!["c", "b", "a"]);
        assert_eq!(set.oldest_sent_at(), Some(10));
    }

    #[test]
    fn ties_break_by_id() {
        let mut set = ConfirmedSet::default();
        set.insert(msg("y", 10));
        set.insert(msg("x", 10));
        assert_eq!(ids(&set), vec!["x", "y"]);
    }

    #[test]
    fn duplicate_ids_are_dropped_without_replacing() {
        let mut set = ConfirmedSet::default();
        set.insert(msg("a", 10));
        let rev = set.revision();
        let mut dupe = msg("a", 99);
        dupe.content = "other".into();
        assert!(!set.insert(dupe));
        assert_eq!(set.len(), 1);
        assert_eq!(set.as_slice()[0].sent_at, 10);
        assert_eq!(set.revision(), rev);
    }

    #[test]
    fn overlapping_pages_merge_to_unique_ids() {
        let mut set = ConfirmedSet::default();
        let added = set.merge((1..=5).map(|i| msg(&format!("m{i}"), i)));
        assert_eq!(added, 5);
        let added = set.merge((4..=8).map(|i| msg(&format!("m{i}"), i)));
        assert_eq!(added, 3);
        assert_eq!(set.len(), 8);
        assert!(set.contains("m8"));
    }
}
