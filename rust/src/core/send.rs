// Optimistic send: queue first, publish in the background, settle on completion.

use parley_transport_traits::{ConversationKey, OutgoingMessage};

use crate::state::now_millis;

use super::queue::{QueuedMessage, QueuedState};
use super::*;

const REASON_TIMED_OUT: &str = "send timed out";
const REASON_NOT_CONFIRMED: &str = "not confirmed by the network";

impl AppCore {
    /// Timestamps are millisecond-granularity; rapid sends can share one.
    /// Keep outgoing timestamps strictly monotonic so queued entries never tie.
    fn next_outgoing_ts(&mut self) -> i64 {
        let now = now_millis();
        if now <= self.last_outgoing_ts {
            self.last_outgoing_ts += 1;
        } else {
            self.last_outgoing_ts = now;
        }
        self.last_outgoing_ts
    }

    pub(super) fn send_message(
        &mut self,
        key: ConversationKey,
        message_id: String,
        content: String,
    ) {
        let content = content.trim().to_string();
        if content.is_empty() {
            return;
        }
        if !self.refresh_transport_status() {
            self.toast(SyncError::TransportUnavailable.user_visible_message());
            return;
        }
        if self.queue.contains(&key, &message_id) {
            tracing::debug!(%key, %message_id, "duplicate send ignored");
            return;
        }

        let sent_at = self.next_outgoing_ts();
        let sender = self.transport.local_address().unwrap_or_default();
        let message = QueuedMessage::pending(message_id, sender, content, sent_at, now_millis());
        if let Err(e) = self.queue.add(&key, message.clone()) {
            self.toast(format!("Send failed: {e}"));
            return;
        }
        tracing::info!(%key, message_id = %message.id, sent_at, "message queued");

        self.publish(&key, &message);
        self.refresh_views();
    }

    pub(super) fn retry_message(&mut self, key: &ConversationKey, message_id: &str) {
        if !self.refresh_transport_status() {
            self.toast(SyncError::TransportUnavailable.user_visible_message());
            return;
        }
        let is_failed = self
            .queue
            .get(key, message_id)
            .is_some_and(QueuedMessage::is_failed);
        if !is_failed {
            self.toast("Nothing to retry");
            return;
        }

        let now = now_millis();
        self.queue.update(key, message_id, |m| {
            m.state = QueuedState::Pending;
            m.attempt += 1;
            m.attempted_at = now;
            m.accepted_at = None;
        });
        let Some(message) = self.queue.get(key, message_id).cloned() else {
            return;
        };
        tracing::info!(%key, %message_id, attempt = message.attempt, "retrying message");

        self.publish(key, &message);
        self.refresh_views();
    }

    pub(super) fn cancel_message(&mut self, key: &ConversationKey, message_id: &str) {
        if self.queue.remove(key, message_id) {
            tracing::info!(%key, %message_id, "queued message cancelled");
        } else {
            tracing::debug!(%key, %message_id, "nothing to cancel");
        }
        self.refresh_views();
    }

    fn publish(&mut self, key: &ConversationKey, message: &QueuedMessage) {
        let outgoing = OutgoingMessage {
            local_id: message.id.clone(),
            content: message.content.clone(),
            sent_at: message.sent_at,
        };
        let key = key.clone();
        let message_id = message.id.clone();
        let attempt = message.attempt;
        let transport = self.transport.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = transport
                .send_message(&key, outgoing)
                .await
                .map_err(SyncError::send);
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::SendCompleted {
                key,
                message_id,
                attempt,
                result,
            })));
        });
    }

    pub(super) fn handle_send_completed(
        &mut self,
        key: ConversationKey,
        message_id: String,
        attempt: u32,
        result: Result<String, SyncError>,
    ) {
        // The queue outlives conversation switches, so results for a closed
        // conversation still settle its entry.
        let current = self
            .queue
            .get(&key, &message_id)
            .is_some_and(|m| m.attempt == attempt && m.is_pending());
        if !current {
            tracing::debug!(%key, %message_id, attempt, "dropping send result for a settled message");
            return;
        }

        match result {
            Ok(network_id) => {
                let now = now_millis();
                let rekey = !network_id.is_empty() && network_id != message_id;
                self.queue.update(&key, &message_id, |m| {
                    m.accepted_at = Some(now);
                    if rekey {
                        m.id = network_id.clone();
                    }
                });
                if rekey {
                    tracing::debug!(%key, %message_id, %network_id, "queued message re-keyed");
                }
                tracing::info!(%key, message_id = %network_id, "message accepted");
                self.prune_confirmed_from_queue();
                self.refresh_views();
            }
            Err(err) => {
                let reason = err.failure_reason();
                tracing::warn!(%key, %message_id, %err, "message send failed");
                self.queue.update(&key, &message_id, |m| {
                    m.state = QueuedState::Failed {
                        reason: reason.clone(),
                    };
                });
                if err == SyncError::TransportUnavailable {
                    self.state.transport_unavailable = true;
                }
                self.refresh_views();
                self.emit_message_failed(key, message_id, reason);
            }
        }
    }

    pub(super) fn start_pending_sweep(&self) {
        let interval = self.config.sweep_interval();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx
                    .send(CoreMsg::Internal(Box::new(InternalEvent::PendingSweep)))
                    .is_err()
                {
                    break;
                }
            }
        });
    }

    /// Promote Pending entries that have waited longer than the configured
    /// timeout to Failed.
    pub(super) fn sweep_pending(&mut self) {
        let now = now_millis();
        let timeout = self.pending_timeout_ms();
        let mut promoted = Vec::new();

        for key in self.queue.keys() {
            let stale: Vec<(String, &'static str)> = self
                .queue
                .entries(&key)
                .iter()
                .filter(|m| m.is_pending() && now.saturating_sub(m.attempted_at) >= timeout)
                .map(|m| {
                    let reason = if m.accepted_at.is_some() {
                        REASON_NOT_CONFIRMED
                    } else {
                        REASON_TIMED_OUT
                    };
                    (m.id.clone(), reason)
                })
                .collect();
            for (id, reason) in stale {
                self.queue.update(&key, &id, |m| {
                    m.state = QueuedState::Failed {
                        reason: reason.to_string(),
                    };
                });
                tracing::warn!(%key, message_id = %id, reason, "pending message expired");
                promoted.push((key.clone(), id, reason.to_string()));
            }
        }

        if promoted.is_empty() {
            return;
        }
        self.refresh_views();
        for (key, id, reason) in promoted {
            self.emit_message_failed(key, id, reason);
        }
    }
}
