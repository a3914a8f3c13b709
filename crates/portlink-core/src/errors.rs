//! Error types for the port protocol layer.
//!
//! - [`TransportError`]: outbound failures reported by an adapter
//! - [`SendError`]: fire-and-forget send failures
//! - [`RequestError`]: request/response call failures, including remote
//!   handler failures reduced to their message
//! - [`HandlerFailure`]: the error request handlers return; only its
//!   message survives the wire

use thiserror::Error;

/// Outbound failure reported by a transport adapter.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying channel is gone.
    #[error("channel closed")]
    Closed,
    /// The adapter could not accept the envelope.
    #[error("{0}")]
    Rejected(String),
}

/// Failure sending a fire-and-forget envelope.
#[derive(Debug, Error)]
pub enum SendError {
    /// `send` was called before any transport was bound.
    #[error("no transport bound; call bind() before sending")]
    NotBound,
    /// The transport adapter rejected the envelope.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// The payload could not be converted to or from its wire form.
    #[error("payload codec failed: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failure of a request/response call.
#[derive(Debug, Error)]
pub enum RequestError {
    /// `request` was called before any transport was bound.
    #[error("no transport bound; call bind() before sending")]
    NotBound,
    /// The transport adapter rejected the request envelope.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    /// The payload or reply could not be converted to or from its wire form.
    #[error("payload codec failed: {0}")]
    Codec(#[from] serde_json::Error),
    /// The peer's handler failed. Carries only the peer's message; stack
    /// and type information are discarded on the wire.
    #[error("{message}")]
    Remote {
        /// Failure message from the peer.
        message: String,
    },
    /// The port was closed while the call was outstanding.
    #[error("port closed")]
    PortClosed,
    /// Compatibility mode only: a later call on the same event name
    /// replaced this call's resolver slot.
    #[error("superseded by a concurrent request on the same event")]
    Superseded,
}

impl From<SendError> for RequestError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::NotBound => Self::NotBound,
            SendError::Transport(t) => Self::Transport(t),
            SendError::Codec(e) => Self::Codec(e),
        }
    }
}

/// Error returned by request handlers.
///
/// Reduced to its message on the wire, as the payload of an `:error`
/// envelope.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerFailure {
    /// Human-readable failure description.
    pub message: String,
}

impl HandlerFailure {
    /// Build a failure from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerFailure {
    fn from(message: &str) -> Self {
        Self {
            message: message.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn not_bound_message_is_descriptive() {
        let err = SendError::NotBound;
        assert!(err.to_string().contains("bind()"));
    }

    #[test]
    fn remote_error_displays_only_the_message() {
        let err = RequestError::Remote {
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn send_error_converts_to_request_error() {
        assert_matches!(
            RequestError::from(SendError::NotBound),
            RequestError::NotBound
        );
        assert_matches!(
            RequestError::from(SendError::Transport(TransportError::Closed)),
            RequestError::Transport(TransportError::Closed)
        );
    }

    #[test]
    fn handler_failure_from_str() {
        let failure = HandlerFailure::from("nope");
        assert_eq!(failure.message, "nope");
        assert_eq!(failure.to_string(), "nope");
    }

    #[test]
    fn transport_error_rejected_display() {
        let err = TransportError::Rejected("queue full".into());
        assert_eq!(err.to_string(), "queue full");
    }
}
