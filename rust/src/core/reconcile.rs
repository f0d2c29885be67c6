// Pure merge of the queue and the confirmed set into the rendered list.

use parley_transport_traits::ConfirmedMessage;

use super::confirmed::ConfirmedSet;
use super::queue::QueuedMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Message {
    Queued(QueuedMessage),
    Confirmed(ConfirmedMessage),
}

#[cfg(test)]
impl Message {
    pub(crate) fn id(&self) -> &str {
        match self {
            Message::Queued(m) => &m.id,
            Message::Confirmed(m) => &m.id,
        }
    }
}

/// Queued entries whose id is not confirmed, in queue order, followed by the
/// confirmed set in display order. Inputs are left untouched.
pub(crate) fn reconcile(queue: &[QueuedMessage], confirmed: &ConfirmedSet) -> Vec<Message> {
    let mut out = Vec::with_capacity(queue.len() + confirmed.len());
    out.extend(
        queue
            .iter()
            .filter(|m| !confirmed.contains(&m.id))
            .cloned()
            .map(Message::Queued),
    );
    out.extend(confirmed.as_slice().iter().cloned().map(Message::Confirmed));
    out
}

/// Ids of queued entries that now have a confirmed counterpart.
pub(crate) fn confirmed_queue_ids(queue: &[QueuedMessage], confirmed: &ConfirmedSet) -> Vec<String> {
    queue
        .iter()
        .filter(|m| confirmed.contains(&m.id))
        .map(|m| m.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::queue::QueuedState;

    fn confirmed(id: &str, sent_at: i64) -> ConfirmedMessage {
        ConfirmedMessage {
            id: id.into(),
            sender: "0xpeer".into(),
            content: id.into(),
            sent_at,
        }
    }

    fn queued(id: &str, sent_at: i64) -> QueuedMessage {
        QueuedMessage::pending(id.into(), "0xme".into(), id.into(), sent_at, sent_at)
    }

    #[test]
    fn empty_inputs_render_nothing() {
        assert!(reconcile(&[], &ConfirmedSet::default()).is_empty());
    }

    #[test]
    fn queued_and_confirmed_collapse_to_confirmed() {
        let mut set = ConfirmedSet::default();
        set.insert(confirmed("x", 5));
        let queue = vec![queued("x", 5)];

        let rendered = reconcile(&queue, &set);
        assert_eq!(rendered, vec![Message::Confirmed(confirmed("x", 5))]);
        assert_eq!(confirmed_queue_ids(&queue, &set), vec!["x".to_string()]);
    }

    #[test]
    fn queued_entries_come_first_in_insertion_order() {
        let mut set = ConfirmedSet::default();
        set.merge(vec![confirmed("old", 1), confirmed("new", 100)]);
        let mut failed = queued("q2", 50);
        failed.state = QueuedState::Failed {
            reason: "offline".into(),
        };
        let queue = vec![queued("q1", 200), failed];

        let ids: Vec<String> = reconcile(&queue, &set)
            .iter()
            .map(|m| m.id().to_string())
            .collect();
        assert_eq!(ids, vec!["q1", "q2", "new", "old"]);
    }

    #[test]
    fn does_not_mutate_inputs() {
        let mut set = ConfirmedSet::default();
        set.insert(confirmed("x", 5));
        let queue = vec![queued("x", 5), queued("y", 6)];
        let _ = reconcile(&queue, &set);
        assert_eq!(queue.len(), 2);
        assert_eq!(set.len(), 1);
    }
}
