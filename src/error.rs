//! Error types for the message-bus protocol layer
//!
//! Connection-establishment failures propagate to the caller of `start`/`run`;
//! per-message handler failures are contained by the dispatcher and surface
//! only through the audit and log streams.

use thiserror::Error;

/// Result alias for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Main error type for bus protocol operations
#[derive(Debug, Error)]
pub enum BusError {
    /// Malformed or missing auth/TLS material. Fatal to `start`.
    #[error("Resolving connection credentials: {0}")]
    Credential(String),

    /// Transport connect failed after the retry bound. Fatal to `start`,
    /// recoverable by calling `start` again later.
    #[error("Connecting to the message bus: {0}")]
    Connection(String),

    /// Connected but could not subscribe. Fatal to `start`; the connection is
    /// left open and the caller must `stop`.
    #[error("Subscribing to {subject}: {reason}")]
    Subscription { subject: String, reason: String },

    /// Payload could not be serialized. Fatal to a single send or reply and
    /// never retried.
    #[error("Marshalling message")]
    Encoding(#[source] serde_json::Error),

    /// Publish failed after the retry bound. Fatal to a single send or reply.
    #[error("Publishing to the message bus: {0}")]
    Transport(String),

    /// Peer certificate rejected during the TLS handshake. Aborts the
    /// handshake and surfaces as part of a connection failure.
    #[error("Peer certificate rejected: {0}")]
    Authentication(String),

    /// A registered handler failed. Logged and audited, never propagated to
    /// the transport.
    #[error("Running handler: {0}")]
    Handler(#[from] HandlerError),
}

/// Per-handler failure; never aborts processing of other handlers
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Decoding request: {0}")]
    Decode(String),

    #[error("Encoding handler response")]
    Encode(#[source] serde_json::Error),

    #[error("Response exceeds maximum allowed length: got {size} bytes, max {max}")]
    ResponseTooLarge { size: usize, max: usize },

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Create a handler failure with a free-text reason
    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self::Failed(message.into())
    }
}
