//! Parley transport traits - the collaborator seams of the conversation sync engine.
//!
//! The sync engine never talks to a messaging network directly. It consumes two
//! capabilities, expressed here as traits:
//!
//! - [`MessagingTransport`]: send a message, fetch a page of confirmed history,
//!   subscribe to live arrivals, and report whether the session is authorized.
//! - [`ProfileResolver`]: best-effort lookup of a display profile for an address.
//!
//! The value types that cross these seams ([`ConversationKey`],
//! [`ConfirmedMessage`], [`HistoryPage`], [`Profile`], ...) live here as well so
//! that transport implementations do not depend on the engine itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::sync::Arc;

use async_trait::async_trait;

pub mod conversation;
pub mod error;
pub mod messages;
pub mod profiles;

pub use conversation::ConversationKey;
pub use error::TransportError;
pub use messages::{ConfirmedMessage, HistoryPage, OutgoingMessage, PageQuery, StreamEvent};
pub use profiles::Profile;

/// Account address on the messaging network.
pub type Address = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Callback handed to [`MessagingTransport::subscribe`].
///
/// Implementations may invoke it from any thread; it must not block.
pub type MessageSink = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Handle for a standing live subscription.
pub trait Subscription: Send {
    /// Stop delivering events for this subscription.
    ///
    /// After this returns the transport must not invoke the sink again, but a
    /// delivery that was already in flight may still land. Consumers are
    /// expected to guard against that themselves.
    fn unsubscribe(self: Box<Self>);
}

/// The messaging network as seen by the sync engine.
#[async_trait]
pub trait MessagingTransport: Send + Sync + 'static {
    /// Whether a messaging session exists. Sending and subscribing are only
    /// attempted while this returns `true`.
    fn is_authorized(&self) -> bool;

    /// Address of the local account, used as the sender of queued messages.
    fn local_address(&self) -> Option<Address>;

    /// Publish a message. Returns the network id of the message, which is the
    /// id its confirmed counterpart will carry.
    ///
    /// Transports that accept client-chosen ids return `message.local_id`.
    async fn send_message(
        &self,
        key: &ConversationKey,
        message: OutgoingMessage,
    ) -> Result<String, TransportError>;

    /// Fetch a page of confirmed messages strictly older than
    /// `query.end_time`, or the most recent page when it is `None`.
    async fn fetch_page(
        &self,
        key: &ConversationKey,
        query: PageQuery,
    ) -> Result<HistoryPage, TransportError>;

    /// Start delivering confirmed arrivals for `key` to `sink`.
    fn subscribe(
        &self,
        key: &ConversationKey,
        sink: MessageSink,
    ) -> Result<Box<dyn Subscription>, TransportError>;
}

/// Read-only identity lookup.
#[async_trait]
pub trait ProfileResolver: Send + Sync + 'static {
    /// Resolve the display profile for `address`, if one exists.
    async fn resolve_profile(&self, address: &str) -> Option<Profile>;
}

/// Resolver used when no identity collaborator is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingProfileResolver;

#[async_trait]
impl ProfileResolver for MissingProfileResolver {
    async fn resolve_profile(&self, _address: &str) -> Option<Profile> {
        None
    }
}
