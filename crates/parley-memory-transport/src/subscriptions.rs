use parley_transport_traits::{ConversationKey, MessageSink, Subscription};

use crate::MemoryTransport;

pub(crate) struct SubscriberSlot {
    pub(crate) id: u64,
    pub(crate) sink: MessageSink,
}

/// Handle returned by [`MemoryTransport::subscribe`](parley_transport_traits::MessagingTransport::subscribe).
///
/// Dropping the handle without calling `unsubscribe` leaves the sink attached.
pub(crate) struct MemorySubscription {
    network: MemoryTransport,
    key: ConversationKey,
    id: u64,
}

impl MemorySubscription {
    pub(crate) fn new(network: MemoryTransport, key: ConversationKey, id: u64) -> Self {
        Self { network, key, id }
    }
}

impl Subscription for MemorySubscription {
    fn unsubscribe(self: Box<Self>) {
        self.network.unsubscribe(&self.key, self.id);
    }
}
