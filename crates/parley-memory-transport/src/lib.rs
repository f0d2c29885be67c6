//! Memory-based messaging network for Parley.
//!
//! [`MemoryTransport`] implements both [`MessagingTransport`] and
//! [`ProfileResolver`] over plain in-process maps. It is non-persistent and is
//! meant for tests, demos and offline development.
//!
//! Besides the trait surface it exposes knobs to script the network:
//! seeding history, delivering messages from a peer, injecting send and fetch
//! failures, delaying responses, toggling authorization, and interrupting
//! streams.
//!
//! ```rust
//! use parley_memory_transport::MemoryTransport;
//! use parley_transport_traits::{ConfirmedMessage, ConversationKey};
//!
//! let network = MemoryTransport::new().with_local_address("0xme");
//! let key = ConversationKey::from_parts("0xpeer", "dm-1");
//! network.seed_history(
//!     &key,
//!     vec![ConfirmedMessage {
//!         id: "m1".into(),
//!         sender: "0xpeer".into(),
//!         content: "gm".into(),
//!         sent_at: 1_000,
//!     }],
//! );
//! assert_eq!(network.history_len(&key), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use parley_transport_traits::{
    Address, ConfirmedMessage, ConversationKey, HistoryPage, MessageSink, MessagingTransport,
    OutgoingMessage, PageQuery, Profile, ProfileResolver, StreamEvent, Subscription,
    TransportError,
};

mod subscriptions;

use self::subscriptions::{MemorySubscription, SubscriberSlot};

const MAX_RETIRED_SINKS: usize = 16;

#[derive(Default)]
struct Inner {
    authorized: bool,
    local_address: Option<Address>,
    histories: HashMap<ConversationKey, Vec<ConfirmedMessage>>,
    subscribers: HashMap<ConversationKey, Vec<SubscriberSlot>>,
    // Sinks of torn-down subscriptions, kept to simulate deliveries that were
    // already in flight when the subscription closed. Capped per key at
    // `MAX_RETIRED_SINKS`, oldest dropped first.
    retired: HashMap<ConversationKey, Vec<MessageSink>>,
    next_subscriber_id: u64,
    next_network_id: u64,
    echo_sends: bool,
    assign_network_ids: bool,
    send_failures: usize,
    fetch_failures: usize,
    send_delay: Option<Duration>,
    fetch_delay: Option<Duration>,
    sent: Vec<(ConversationKey, OutgoingMessage)>,
    fetch_log: Vec<(ConversationKey, PageQuery)>,
    profiles: HashMap<String, Profile>,
}

/// In-memory messaging network.
///
/// Cloning is cheap and every clone observes the same network.
#[derive(Clone)]
pub struct MemoryTransport {
    inner: Arc<RwLock<Inner>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Authorized network that echoes sent messages back as confirmations.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                authorized: true,
                echo_sends: true,
                ..Inner::default()
            })),
        }
    }

    /// Set the address reported as the local account.
    pub fn with_local_address(self, address: impl Into<Address>) -> Self {
        self.inner.write().local_address = Some(address.into());
        self
    }

    /// Toggle the messaging session.
    pub fn set_authorized(&self, authorized: bool) {
        self.inner.write().authorized = authorized;
    }

    /// When enabled (the default), a successful send stores the message and
    /// delivers it to subscribers as confirmed.
    pub fn set_echo_sends(&self, echo: bool) {
        self.inner.write().echo_sends = echo;
    }

    /// When enabled, sends are acknowledged with a network-assigned id
    /// instead of the client's local id.
    pub fn set_assign_network_ids(&self, assign: bool) {
        self.inner.write().assign_network_ids = assign;
    }

    /// Make the next `count` sends fail with a network error.
    pub fn fail_next_sends(&self, count: usize) {
        self.inner.write().send_failures = count;
    }

    /// Make the next `count` fetches fail with a network error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.inner.write().fetch_failures = count;
    }

    /// Delay every send response.
    pub fn set_send_delay(&self, delay: Option<Duration>) {
        self.inner.write().send_delay = delay;
    }

    /// Delay every fetch response.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.inner.write().fetch_delay = delay;
    }

    /// Add confirmed messages to a conversation without notifying anyone.
    pub fn seed_history(&self, key: &ConversationKey, messages: Vec<ConfirmedMessage>) {
        self.inner
            .write()
            .histories
            .entry(key.clone())
            .or_default()
            .extend(messages);
    }

    /// Number of stored messages for a conversation.
    pub fn history_len(&self, key: &ConversationKey) -> usize {
        self.inner
            .read()
            .histories
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Store a confirmed message and deliver it to live subscribers.
    ///
    /// Returns the number of sinks notified.
    pub fn deliver(&self, key: &ConversationKey, message: ConfirmedMessage) -> usize {
        let sinks = {
            let mut inner = self.inner.write();
            inner
                .histories
                .entry(key.clone())
                .or_default()
                .push(message.clone());
            live_sinks(&inner, key)
        };
        notify(&sinks, StreamEvent::Message(message))
    }

    /// Invoke the sinks of already torn-down subscriptions for `key`.
    ///
    /// Models a delivery that raced the teardown. Nothing is stored.
    pub fn replay_to_retired(&self, key: &ConversationKey, message: ConfirmedMessage) -> usize {
        let sinks = self
            .inner
            .read()
            .retired
            .get(key)
            .cloned()
            .unwrap_or_default();
        notify(&sinks, StreamEvent::Message(message))
    }

    /// Drop every live subscription for `key`, telling each sink why.
    pub fn interrupt(&self, key: &ConversationKey, reason: &str) -> usize {
        let sinks: Vec<MessageSink> = {
            let mut inner = self.inner.write();
            let slots = inner.subscribers.remove(key).unwrap_or_default();
            let sinks: Vec<MessageSink> = slots.into_iter().map(|slot| slot.sink).collect();
            retire(&mut inner, key, sinks.iter().cloned());
            sinks
        };
        tracing::debug!(%key, reason, count = sinks.len(), "memory transport: interrupting stream");
        notify(
            &sinks,
            StreamEvent::Interrupted {
                reason: reason.to_string(),
            },
        )
    }

    /// Number of live subscriptions for `key`.
    pub fn subscriber_count(&self, key: &ConversationKey) -> usize {
        self.inner
            .read()
            .subscribers
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Every message accepted by [`MessagingTransport::send_message`], in order.
    pub fn sent_messages(&self) -> Vec<(ConversationKey, OutgoingMessage)> {
        self.inner.read().sent.clone()
    }

    /// Every page query received, in order.
    pub fn fetch_log(&self) -> Vec<(ConversationKey, PageQuery)> {
        self.inner.read().fetch_log.clone()
    }

    /// Register a profile for the identity lookup.
    pub fn insert_profile(&self, profile: Profile) {
        self.inner
            .write()
            .profiles
            .insert(profile.address.to_ascii_lowercase(), profile);
    }

    fn unsubscribe(&self, key: &ConversationKey, subscriber_id: u64) {
        let mut inner = self.inner.write();
        let Some(slots) = inner.subscribers.get_mut(key) else {
            return;
        };
        let Some(pos) = slots.iter().position(|slot| slot.id == subscriber_id) else {
            return;
        };
        let slot = slots.remove(pos);
        if slots.is_empty() {
            inner.subscribers.remove(key);
        }
        retire(&mut inner, key, std::iter::once(slot.sink));
    }
}

fn retire(inner: &mut Inner, key: &ConversationKey, sinks: impl IntoIterator<Item = MessageSink>) {
    let retired = inner.retired.entry(key.clone()).or_default();
    retired.extend(sinks);
    let excess = retired.len().saturating_sub(MAX_RETIRED_SINKS);
    retired.drain(..excess);
}

fn live_sinks(inner: &Inner, key: &ConversationKey) -> Vec<MessageSink> {
    inner
        .subscribers
        .get(key)
        .map(|slots| slots.iter().map(|slot| slot.sink.clone()).collect())
        .unwrap_or_default()
}

// Sinks are always invoked outside the lock so they may call back into the
// transport.
fn notify(sinks: &[MessageSink], event: StreamEvent) -> usize {
    for sink in sinks {
        sink(event.clone());
    }
    sinks.len()
}

/// Most recent first, ties broken by id.
fn page_order(a: &ConfirmedMessage, b: &ConfirmedMessage) -> std::cmp::Ordering {
    b.sent_at.cmp(&a.sent_at).then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl MessagingTransport for MemoryTransport {
    fn is_authorized(&self) -> bool {
        self.inner.read().authorized
    }

    fn local_address(&self) -> Option<Address> {
        self.inner.read().local_address.clone()
    }

    async fn send_message(
        &self,
        key: &ConversationKey,
        message: OutgoingMessage,
    ) -> Result<String, TransportError> {
        let delay = self.inner.read().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (network_id, sinks, confirmed) = {
            let mut inner = self.inner.write();
            if !inner.authorized {
                return Err(TransportError::Unauthorized);
            }
            if inner.send_failures > 0 {
                inner.send_failures -= 1;
                return Err(TransportError::Network("simulated send failure".into()));
            }
            inner.sent.push((key.clone(), message.clone()));

            let network_id = if inner.assign_network_ids {
                inner.next_network_id += 1;
                format!("net-{}", inner.next_network_id)
            } else {
                message.local_id.clone()
            };

            if !inner.echo_sends {
                (network_id, Vec::new(), None)
            } else {
                let confirmed = ConfirmedMessage {
                    id: network_id.clone(),
                    sender: inner.local_address.clone().unwrap_or_default(),
                    content: message.content.clone(),
                    sent_at: message.sent_at,
                };
                inner
                    .histories
                    .entry(key.clone())
                    .or_default()
                    .push(confirmed.clone());
                (network_id, live_sinks(&inner, key), Some(confirmed))
            }
        };

        if let Some(confirmed) = confirmed {
            notify(&sinks, StreamEvent::Message(confirmed));
        }
        Ok(network_id)
    }

    async fn fetch_page(
        &self,
        key: &ConversationKey,
        query: PageQuery,
    ) -> Result<HistoryPage, TransportError> {
        let delay = self.inner.read().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.write();
        inner.fetch_log.push((key.clone(), query));
        if inner.fetch_failures > 0 {
            inner.fetch_failures -= 1;
            return Err(TransportError::Network("simulated fetch failure".into()));
        }

        let mut older: Vec<ConfirmedMessage> = inner
            .histories
            .get(key)
            .map(|all| {
                all.iter()
                    .filter(|m| query.end_time.is_none_or(|end| m.sent_at < end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        older.sort_by(page_order);

        let has_more = older.len() > query.limit;
        older.truncate(query.limit);
        Ok(HistoryPage {
            messages: older,
            has_more,
        })
    }

    fn subscribe(
        &self,
        key: &ConversationKey,
        sink: MessageSink,
    ) -> Result<Box<dyn Subscription>, TransportError> {
        let mut inner = self.inner.write();
        if !inner.authorized {
            return Err(TransportError::Unauthorized);
        }
        inner.next_subscriber_id += 1;
        let id = inner.next_subscriber_id;
        inner
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(SubscriberSlot { id, sink });
        Ok(Box::new(MemorySubscription::new(self.clone(), key.clone(), id)))
    }
}

#[async_trait]
impl ProfileResolver for MemoryTransport {
    async fn resolve_profile(&self, address: &str) -> Option<Profile> {
        self.inner
            .read()
            .profiles
            .get(&address.to_ascii_lowercase())
            .cloned()
    }
}
