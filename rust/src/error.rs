use parley_transport_traits::TransportError;
use thiserror::Error;

/// Failure modes surfaced by the sync engine. None of them is fatal: each one
/// ends up as state on the conversation view or on a queued message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No messaging session. Disables the composer and pagination.
    #[error("messaging transport unavailable")]
    TransportUnavailable,
    /// A single outgoing message could not be published.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// A history page could not be fetched. Nothing was mutated.
    #[error("fetch failed: {0}")]
    FetchFailed(String),
    /// The live subscription dropped.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl SyncError {
    pub(crate) fn send(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => Self::TransportUnavailable,
            other => Self::SendFailed(other.to_string()),
        }
    }

    pub(crate) fn fetch(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => Self::TransportUnavailable,
            other => Self::FetchFailed(other.to_string()),
        }
    }

    pub(crate) fn stream(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized => Self::TransportUnavailable,
            other => Self::StreamInterrupted(other.to_string()),
        }
    }

    pub fn user_visible_message(&self) -> &'static str {
        match self {
            SyncError::TransportUnavailable => "Messaging is not available. Sign in to continue.",
            SyncError::SendFailed(_) => "Message failed to send",
            SyncError::FetchFailed(_) => "Could not load messages",
            SyncError::StreamInterrupted(_) => "Live updates paused",
        }
    }

    /// Reason stored on a failed queued message.
    pub(crate) fn failure_reason(&self) -> String {
        match self {
            SyncError::SendFailed(reason) | SyncError::FetchFailed(reason) => reason.clone(),
            SyncError::StreamInterrupted(reason) => reason.clone(),
            SyncError::TransportUnavailable => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queued message id must not be empty")]
    EmptyId,
}
