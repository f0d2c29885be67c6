// Backward history paging for the open conversation.

use std::sync::Arc;

use parley_transport_traits::{
    ConversationKey, HistoryPage, MessagingTransport, PageQuery, Timestamp,
};

use super::*;

/// Pulls pages of confirmed history. Never touches the cursor; the actor
/// decides where the next page starts.
#[derive(Clone)]
pub(crate) struct HistoryFetcher {
    transport: Arc<dyn MessagingTransport>,
    page_size: usize,
}

impl HistoryFetcher {
    pub(crate) fn new(transport: Arc<dyn MessagingTransport>, page_size: usize) -> Self {
        Self {
            transport,
            page_size: page_size.max(1),
        }
    }

    pub(crate) fn query(&self, end_time: Option<Timestamp>) -> PageQuery {
        PageQuery {
            end_time,
            limit: self.page_size,
        }
    }

    pub(crate) async fn fetch_page(
        &self,
        key: &ConversationKey,
        query: PageQuery,
    ) -> Result<HistoryPage, SyncError> {
        let mut page = self
            .transport
            .fetch_page(key, query)
            .await
            .map_err(SyncError::fetch)?;
        if let Some(end) = query.end_time {
            // Only strictly older messages belong to a backward page.
            page.messages.retain(|m| m.sent_at < end);
        }
        Ok(page)
    }
}

impl AppCore {
    pub(super) fn start_fetch(&mut self, end_time: Option<Timestamp>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if let Some(in_flight) = active.fetch_in_flight {
            tracing::debug!(key = %active.key, ?in_flight, "fetch already in flight");
            return;
        }
        let query = self.history.query(end_time);
        active.fetch_in_flight = Some(query);
        active.fetch_error = None;

        let key = active.key.clone();
        let epoch = active.epoch;
        let fetcher = self.history.clone();
        let tx = self.core_sender.clone();
        tracing::debug!(%key, epoch, ?query, "fetching history page");
        self.runtime.spawn(async move {
            let result = fetcher.fetch_page(&key, query).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::PageFetched {
                key,
                epoch,
                query,
                result,
            })));
        });
    }

    pub(super) fn request_older_page(&mut self, key: &ConversationKey) {
        let authorized = self.refresh_transport_status();
        let Some(active) = self.active.as_ref() else {
            tracing::debug!(%key, "older page requested with no open conversation");
            return;
        };
        if active.key != *key {
            tracing::debug!(%key, active = %active.key, "older page requested for a closed conversation");
            return;
        }
        if !authorized {
            self.refresh_views();
            return;
        }
        if active.fetch_in_flight.is_some() || !self.cursors.get(key).has_more {
            return;
        }
        let Some(oldest) = active.confirmed.oldest_sent_at() else {
            return;
        };

        // The cursor only moves once the page lands.
        self.start_fetch(Some(oldest));
        self.refresh_views();
    }

    pub(super) fn handle_page_fetched(
        &mut self,
        key: ConversationKey,
        epoch: u64,
        query: PageQuery,
        result: Result<HistoryPage, SyncError>,
    ) {
        let Some(active) = self.active.as_mut().filter(|a| a.is(&key, epoch)) else {
            tracing::debug!(%key, epoch, "dropping stale history page");
            return;
        };
        active.fetch_in_flight = None;

        match result {
            Ok(page) => {
                let fetched = page.messages.len();
                let added = active.confirmed.merge(page.messages);
                active.fetch_error = None;
                if let Some(end_time) = query.end_time {
                    self.cursors.advance(&key, end_time);
                }
                self.cursors.set_has_more(&key, page.has_more);
                tracing::debug!(
                    %key,
                    ?query,
                    fetched,
                    added,
                    has_more = page.has_more,
                    "history page merged"
                );
                self.prune_confirmed_from_queue();
            }
            Err(err) => {
                tracing::warn!(%key, ?query, %err, "history fetch failed");
                active.fetch_error = Some(err.user_visible_message().to_string());
                if err == SyncError::TransportUnavailable {
                    self.state.transport_unavailable = true;
                }
            }
        }
        self.refresh_views();
    }
}

#[cfg(test)]
mod tests {
    use parley_memory_transport::MemoryTransport;
    use parley_transport_traits::ConfirmedMessage;

    use super::super::test_support::Harness;
    use super::*;

    fn msg(id: &str, sent_at: Timestamp) -> ConfirmedMessage {
        ConfirmedMessage {
            id: id.into(),
            sender: "0xpeer".into(),
            content: id.into(),
            sent_at,
        }
    }

    #[tokio::test]
    async fn first_page_is_most_recent() {
        let network = MemoryTransport::new();
        let key = ConversationKey::new("0xpeer/1");
        network.seed_history(&key, (1..=30).map(|i| msg(&format!("m{i}"), i)).collect());

        let fetcher = HistoryFetcher::new(Arc::new(network.clone()), 20);
        let page = fetcher.fetch_page(&key, fetcher.query(None)).await.unwrap();
        assert_eq!(page.messages.len(), 20);
        assert_eq!(page.messages[0].id, "m30");
        assert!(page.has_more);
        assert_eq!(network.fetch_log()[0].1.limit, 20);
    }

    #[tokio::test]
    async fn failure_maps_to_fetch_failed() {
        let network = MemoryTransport::new();
        network.fail_next_fetches(1);
        let fetcher = HistoryFetcher::new(Arc::new(network), 20);
        let err = fetcher
            .fetch_page(&ConversationKey::new("0xpeer/1"), fetcher.query(Some(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::FetchFailed(_)));
    }

    #[test]
    fn failed_older_page_leaves_cursor_and_set_alone() {
        let mut h = Harness::new();
        let key = ConversationKey::from_parts("0xpeer", "dm-1");
        h.network
            .seed_history(&key, (1..=45).map(|i| msg(&format!("h{i}"), i * 1_000)).collect());
        h.act(AppAction::OpenConversation { key: key.clone() });
        h.pump_until("initial page", |c| {
            c.active.as_ref().is_some_and(|a| a.fetch_in_flight.is_none())
        });
        assert_eq!(h.core.cursors.get(&key).end_time, None);

        h.network.fail_next_fetches(1);
        h.act(AppAction::LoadOlderMessages { key: key.clone() });
        h.pump_until("failed page", |c| {
            c.active.as_ref().is_some_and(|a| a.fetch_error.is_some())
        });
        let active = h.core.active.as_ref().unwrap();
        assert_eq!(active.confirmed.len(), 20);
        assert_eq!(h.core.cursors.get(&key).end_time, None);
        assert!(h.core.cursors.get(&key).has_more);

        h.act(AppAction::LoadOlderMessages { key: key.clone() });
        h.pump_until("older page", |c| {
            c.active.as_ref().is_some_and(|a| a.confirmed.len() == 40)
        });
        let log = h.network.fetch_log();
        assert_eq!(log[1].1.end_time, Some(26_000));
        assert_eq!(log[2].1.end_time, log[1].1.end_time);
        assert_eq!(h.core.cursors.get(&key).end_time, Some(26_000));
        assert!(h.core.active.as_ref().unwrap().fetch_error.is_none());
    }

    #[test]
    fn page_size_is_at_least_one() {
        let fetcher = HistoryFetcher::new(Arc::new(MemoryTransport::new()), 0);
        assert_eq!(fetcher.query(Some(5)).limit, 1);
    }
}
