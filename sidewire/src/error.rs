//! Error types for sidewire operations.
//!
//! Every failure of a request/response cycle is classified into one
//! [`Error`] variant. The underlying cause, when there is one, stays
//! reachable through [`std::error::Error::source`].

use std::io;

use sidewire_proto::PeerError;

/// Alias for `Result<T, sidewire::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Type-erased underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`ServerConnection`](crate::ServerConnection) operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A send or receive step on the connection failed.
    #[error("lost connection to peer")]
    TransportLost {
        /// What the transport reported.
        #[source]
        cause: TransportError,
    },

    /// The outgoing payload could not be serialized or framed.
    #[error("invalid request")]
    InvalidRequest {
        /// Serialization or framing failure.
        #[source]
        cause: BoxError,
    },

    /// The reply could not be decoded, or was not the kind the command expects.
    #[error("unexpected response from peer")]
    UnexpectedResponse {
        /// Decoding failure, absent when the reply decoded to the wrong kind.
        #[source]
        cause: Option<serde_json::Error>,
    },

    /// The peer rejected the command.
    #[error("peer reported an error")]
    ApplicationError(#[from] PeerError),

    /// No device identifier was available; nothing was sent.
    #[error("device identifier is unknown")]
    UnknownIdentifier,
}

/// Classification of an [`Error`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::TransportLost`].
    TransportLost,
    /// See [`Error::InvalidRequest`].
    InvalidRequest,
    /// See [`Error::UnexpectedResponse`].
    UnexpectedResponse,
    /// See [`Error::ApplicationError`].
    ApplicationError,
    /// See [`Error::UnknownIdentifier`].
    UnknownIdentifier,
}

impl Error {
    /// Wraps a serialization or framing failure of the outgoing payload.
    pub fn invalid_request(cause: impl Into<BoxError>) -> Self {
        Self::InvalidRequest {
            cause: cause.into(),
        }
    }

    /// Wraps a reply that failed to decode (`Some`) or had the wrong kind (`None`).
    pub const fn unexpected_response(cause: Option<serde_json::Error>) -> Self {
        Self::UnexpectedResponse { cause }
    }

    /// Returns the classification of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TransportLost { .. } => ErrorKind::TransportLost,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            Self::ApplicationError(_) => ErrorKind::ApplicationError,
            Self::UnknownIdentifier => ErrorKind::UnknownIdentifier,
        }
    }

    /// Returns the peer's error if this is [`Error::ApplicationError`].
    pub const fn peer_error(&self) -> Option<&PeerError> {
        match self {
            Self::ApplicationError(e) => Some(e),
            _ => None,
        }
    }

    /// Returns the transport failure if this is [`Error::TransportLost`].
    pub const fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::TransportLost { cause } => Some(cause),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(cause: TransportError) -> Self {
        Self::TransportLost { cause }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        TransportError::from(e).into()
    }
}

/// Failure reported by a [`Connection`](crate::Connection).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// An I/O error on the underlying stream.
    #[error(transparent)]
    Io(io::Error),

    /// The peer closed the stream before all expected bytes arrived.
    #[error("connection closed by peer")]
    Closed,

    /// [`Connection::disconnect`](crate::Connection::disconnect) was called.
    #[error("connection was disconnected")]
    Disconnected,

    /// The peer announced a frame larger than the configured limit.
    #[error("frame of {len} bytes exceeds {max} byte limit")]
    FrameTooLarge {
        /// Announced payload length.
        len: u32,
        /// Configured limit.
        max: u32,
    },
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::Closed
        } else {
            Self::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn io_error_keeps_cause() {
        let err = Error::from(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
        assert_eq!(err.kind(), ErrorKind::TransportLost);
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "peer reset");
        assert!(matches!(err.transport_error(), Some(TransportError::Io(_))));
    }

    #[test]
    fn eof_maps_to_closed() {
        let err = TransportError::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn peer_error_is_inspectable() {
        let err = Error::from(PeerError::new(7, Some("denied".into())));
        assert_eq!(err.kind(), ErrorKind::ApplicationError);
        assert_eq!(err.peer_error().map(|e| e.code), Some(7));
        assert_eq!(err.source().unwrap().to_string(), "denied (code 7)");
    }

    #[test]
    fn invalid_request_wraps_any_cause() {
        let err = Error::invalid_request("frame exceeds u32::MAX");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.source().unwrap().to_string(), "frame exceeds u32::MAX");
    }

    #[test]
    fn wrong_kind_has_no_cause() {
        let err = Error::unexpected_response(None);
        assert_eq!(err.kind(), ErrorKind::UnexpectedResponse);
        assert!(err.source().is_none());
    }
}
