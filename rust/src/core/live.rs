// Live ingestion for the open conversation.

use std::sync::Arc;

use parley_transport_traits::{
    ConversationKey, MessageSink, MessagingTransport, StreamEvent, Subscription,
};

use super::*;

struct LiveSubscription {
    key: ConversationKey,
    token: u64,
    handle: Box<dyn Subscription>,
}

/// Holds at most one standing subscription.
///
/// Every subscription gets a fresh token and the sink tags each delivery with
/// it, so deliveries that race a teardown can be recognized and dropped.
#[derive(Default)]
pub(crate) struct LiveIngestor {
    current: Option<LiveSubscription>,
    next_token: u64,
}

impl LiveIngestor {
    /// Tear down any previous subscription, then subscribe to `key`.
    pub(crate) fn attach(
        &mut self,
        transport: &dyn MessagingTransport,
        key: &ConversationKey,
        core_sender: Sender<CoreMsg>,
    ) -> Result<u64, SyncError> {
        self.teardown();
        self.next_token += 1;
        let token = self.next_token;

        let sink_key = key.clone();
        let sink: MessageSink = Arc::new(move |event: StreamEvent| {
            let _ = core_sender.send(CoreMsg::Internal(Box::new(
                InternalEvent::StreamDelivered {
                    key: sink_key.clone(),
                    token,
                    event,
                },
            )));
        });
        let handle = transport.subscribe(key, sink).map_err(SyncError::stream)?;
        self.current = Some(LiveSubscription {
            key: key.clone(),
            token,
            handle,
        });
        Ok(token)
    }

    /// Returns whether a subscription was torn down.
    pub(crate) fn teardown(&mut self) -> bool {
        match self.current.take() {
            Some(sub) => {
                sub.handle.unsubscribe();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_current(&self, key: &ConversationKey, token: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|sub| sub.token == token && sub.key == *key)
    }

    pub(crate) fn is_attached_to(&self, key: &ConversationKey) -> bool {
        self.current.as_ref().is_some_and(|sub| sub.key == *key)
    }
}

impl AppCore {
    pub(super) fn attach_stream(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match self
            .live
            .attach(self.transport.as_ref(), &active.key, self.core_sender.clone())
        {
            Ok(token) => {
                tracing::debug!(key = %active.key, token, "live subscription attached");
                active.stream_interrupted = false;
            }
            Err(err) => {
                tracing::warn!(key = %active.key, %err, "live subscription failed");
                active.stream_interrupted = true;
                if err == SyncError::TransportUnavailable {
                    self.state.transport_unavailable = true;
                }
            }
        }
    }

    pub(super) fn handle_stream_delivered(
        &mut self,
        key: ConversationKey,
        token: u64,
        event: StreamEvent,
    ) {
        if !self.live.is_current(&key, token) {
            tracing::debug!(%key, token, "dropping delivery from retired subscription");
            return;
        }
        let Some(active) = self.active.as_mut().filter(|a| a.key == key) else {
            return;
        };

        match event {
            StreamEvent::Message(message) => {
                let id = message.id.clone();
                if !active.confirmed.insert(message) {
                    tracing::debug!(%key, message_id = %id, "duplicate live delivery");
                    return;
                }
                tracing::debug!(%key, message_id = %id, "live message merged");
                self.prune_confirmed_from_queue();
            }
            StreamEvent::Interrupted { reason } => {
                tracing::warn!(%key, %reason, "live subscription interrupted");
                active.stream_interrupted = true;
                self.live.teardown();
            }
        }
        self.refresh_views();
    }
}
