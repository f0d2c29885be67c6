//! Message types exchanged with the transport

use serde::{Deserialize, Serialize};

use crate::{Address, Timestamp};

/// A message acknowledged as persisted by the messaging network.
///
/// Immutable once received, whether it arrived through a history page or the
/// live stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfirmedMessage {
    /// Network id
    pub id: String,
    /// Sender address
    pub sender: Address,
    /// Message body
    pub content: String,
    /// Sender-side timestamp
    pub sent_at: Timestamp,
}

/// A message handed to [`MessagingTransport::send_message`](crate::MessagingTransport::send_message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Id the client generated for the optimistic entry.
    pub local_id: String,
    /// Message body
    pub content: String,
    /// Timestamp the client assigned
    pub sent_at: Timestamp,
}

/// Parameters for a backward history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQuery {
    /// Only messages strictly older than this are returned. `None` requests
    /// the most recent page.
    pub end_time: Option<Timestamp>,
    /// Maximum number of messages to return
    pub limit: usize,
}

/// One page of confirmed history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Messages, most recent first
    pub messages: Vec<ConfirmedMessage>,
    /// Whether older messages remain on the network
    pub has_more: bool,
}

/// Event delivered to a [`MessageSink`](crate::MessageSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A newly confirmed message
    Message(ConfirmedMessage),
    /// The subscription dropped and will deliver nothing further.
    Interrupted {
        /// Why the stream ended
        reason: String,
    },
}
