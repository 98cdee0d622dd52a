//! Transport abstraction over the embedding environment's cross-document
//! messaging.
//!
//! Delivery is asynchronous, unordered across senders and at most once per
//! send. Messages cross the transport in serialized form (`serde_json::Value`),
//! so the receiver always re-validates.

pub mod memory;

/// Failure to hand a message to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("transport rejected message: {0}")]
    Rejected(String),
}

/// Outbound half of a channel: the child's view of its host, or the host's
/// view of one child.
pub trait Transport: Send + Sync {
    fn post(&self, message: serde_json::Value) -> Result<(), TransportError>;
}

/// Host-side handle to a child's frame or container.
///
/// The host only ever holds a weak reference to it; the embedding layer owns
/// the frame.
pub trait FrameHandle: Transport {
    /// Navigate the frame to `url`, discarding its current location.
    fn reload(&self, url: &str) -> Result<(), TransportError>;
}
