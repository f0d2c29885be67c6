use std::collections::BTreeMap;

use parley_transport_traits::{ConversationKey, Profile};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppState {
    pub rev: u64,
    /// Mirrors `MessagingTransport::is_authorized()` as of the last action.
    pub transport_unavailable: bool,
    pub current_conversation: Option<ConversationViewState>,
    /// Queued (pending or failed) messages per conversation, including
    /// conversations that are not open.
    pub outbox: BTreeMap<ConversationKey, Vec<ChatMessage>>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            transport_unavailable: false,
            current_conversation: None,
            outbox: BTreeMap::new(),
            toast: None,
        }
    }

    pub fn active_key(&self) -> Option<&ConversationKey> {
        self.current_conversation.as_ref().map(|c| &c.key)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversationViewState {
    pub key: ConversationKey,
    pub title: String,
    pub peer_address: Option<String>,
    pub peer_profile: Option<Profile>,
    /// Queued messages first (oldest queued first), then confirmed messages
    /// newest first.
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub can_load_older: bool,
    /// A history fetch is in flight.
    pub loading: bool,
    /// The in-flight fetch is for an older page.
    pub loading_older: bool,
    pub fetch_error: Option<String>,
    pub stream_interrupted: bool,
    pub composer_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub sent_at: i64,
    pub is_mine: bool,
    pub delivery: MessageDeliveryState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MessageDeliveryState {
    /// Queued, no answer from the transport yet.
    Pending,
    /// Queued, accepted by the transport, confirmation not yet observed.
    Sent,
    Failed { reason: String },
    Confirmed,
}

impl MessageDeliveryState {
    pub fn is_queued(&self) -> bool {
        !matches!(self, MessageDeliveryState::Confirmed)
    }
}

pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Shorten an address for display: `0x1234…abcd`.
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.trim().chars().collect();
    if chars.len() <= 10 {
        return chars.into_iter().collect();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
