//! Transport error types

use thiserror::Error;

/// Errors reported by a [`MessagingTransport`](crate::MessagingTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No messaging session exists.
    #[error("messaging session is not authorized")]
    Unauthorized,
    /// The network could not be reached or the request failed in transit.
    #[error("network error: {0}")]
    Network(String),
    /// The network rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The transport was shut down.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Unauthorized)
    }
}
