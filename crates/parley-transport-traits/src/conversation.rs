//! Conversation keys

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one messaging thread.
///
/// Keys built by the client look like `<peer address>/<conversation id>`, but
/// the engine only relies on equality and hashing. [`ConversationKey::peer_address`]
/// is a convenience for the identity lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    /// Wrap a raw key.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build a key from a peer address and a conversation id.
    pub fn from_parts(peer_address: &str, conversation_id: &str) -> Self {
        Self(format!(
            "{}/{}",
            peer_address.trim().to_ascii_lowercase(),
            conversation_id.trim()
        ))
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The peer address encoded in the key.
    ///
    /// Keys without a `/` are treated as a bare address. Returns `None` when
    /// the address segment is empty.
    pub fn peer_address(&self) -> Option<String> {
        let segment = match self.0.split_once('/') {
            Some((address, _)) => address,
            None => self.0.as_str(),
        };
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }
        Some(segment.to_ascii_lowercase())
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ConversationKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
