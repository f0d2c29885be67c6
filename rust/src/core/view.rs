// View-state assembly: queue + confirmed set -> snapshot published to the UI.

use std::collections::BTreeMap;

use crate::state::{ChatMessage, ConversationViewState, MessageDeliveryState};

use super::queue::{QueuedMessage, QueuedState};
use super::reconcile::{reconcile, Message};
use super::*;

/// Rendered list memoized on the revisions it was computed from.
pub(super) struct RenderCache {
    queue_revision: u64,
    confirmed_revision: u64,
    messages: Vec<ChatMessage>,
}

fn queued_to_chat(m: &QueuedMessage) -> ChatMessage {
    let delivery = match &m.state {
        QueuedState::Failed { reason } => MessageDeliveryState::Failed {
            reason: reason.clone(),
        },
        QueuedState::Pending if m.accepted_at.is_some() => MessageDeliveryState::Sent,
        QueuedState::Pending => MessageDeliveryState::Pending,
    };
    ChatMessage {
        id: m.id.clone(),
        sender: m.sender.clone(),
        sender_name: None,
        content: m.content.clone(),
        sent_at: m.sent_at,
        is_mine: true,
        delivery,
    }
}

fn to_chat_message(
    message: Message,
    local_address: Option<&str>,
    peer_name: Option<&str>,
) -> ChatMessage {
    match message {
        Message::Queued(m) => queued_to_chat(&m),
        Message::Confirmed(m) => {
            let is_mine = local_address.is_some_and(|me| me.eq_ignore_ascii_case(&m.sender));
            ChatMessage {
                sender_name: if is_mine {
                    None
                } else {
                    peer_name.map(ToString::to_string)
                },
                id: m.id,
                sender: m.sender,
                content: m.content,
                sent_at: m.sent_at,
                is_mine,
                delivery: MessageDeliveryState::Confirmed,
            }
        }
    }
}

impl AppCore {
    /// Rebuild the published snapshot and emit it.
    pub(super) fn refresh_views(&mut self) {
        self.state.current_conversation = self.build_conversation_view();
        self.state.outbox = self.build_outbox();
        self.emit_state();
    }

    fn build_conversation_view(&mut self) -> Option<ConversationViewState> {
        let local_address = self.transport.local_address();
        let transport_unavailable = self.state.transport_unavailable;
        let app_name = self.config.app_name().to_string();
        let active = self.active.as_mut()?;

        let peer_address = active.key.peer_address();
        let peer_name = active.peer_profile.as_ref().and_then(Profile::best_name);
        let queue_revision = self.queue.revision(&active.key);
        let confirmed_revision = active.confirmed.revision();

        let hit = active
            .render_cache
            .as_ref()
            .filter(|c| {
                c.queue_revision == queue_revision && c.confirmed_revision == confirmed_revision
            })
            .map(|c| c.messages.clone());
        let messages = match hit {
            Some(messages) => messages,
            None => {
                let rendered: Vec<ChatMessage> =
                    reconcile(self.queue.entries(&active.key), &active.confirmed)
                        .into_iter()
                        .map(|m| to_chat_message(m, local_address.as_deref(), peer_name.as_deref()))
                        .collect();
                active.render_cache = Some(RenderCache {
                    queue_revision,
                    confirmed_revision,
                    messages: rendered.clone(),
                });
                rendered
            }
        };

        let has_more = self.cursors.get(&active.key).has_more;
        let loading = active.fetch_in_flight.is_some();
        Some(ConversationViewState {
            key: active.key.clone(),
            title: profile::conversation_title(
                peer_address.as_deref(),
                active.peer_profile.as_ref(),
                &app_name,
            ),
            peer_address,
            peer_profile: active.peer_profile.clone(),
            messages,
            has_more,
            can_load_older: has_more
                && !transport_unavailable
                && !loading
                && !active.confirmed.is_empty(),
            loading,
            loading_older: active
                .fetch_in_flight
                .is_some_and(|q| q.end_time.is_some()),
            fetch_error: active.fetch_error.clone(),
            stream_interrupted: active.stream_interrupted,
            composer_enabled: !transport_unavailable,
        })
    }

    fn build_outbox(&self) -> BTreeMap<ConversationKey, Vec<ChatMessage>> {
        self.queue
            .keys()
            .into_iter()
            .map(|key| {
                let messages = self.queue.snapshot(&key).iter().map(queued_to_chat).collect();
                (key, messages)
            })
            .collect()
    }
}
