//! Layered connection error taxonomy (§1b, §7): an inner, exhaustively-matched
//! cause, an outer state-aware wrapper, and the public type exposed from
//! `lib.rs`. Mirrors the shape `session::error` uses, which in turn mirrors
//! the teacher's `connection::error::{ConnectionInnerError, ConnectionStateError}`.

use crate::error::{HandshakeError, SaslError};
use crate::frame::CloseCode;

/// Raised by the connection engine's own state checks; never escapes the
/// module boundary without being wrapped by [`ConnectionStateError`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectionInnerError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Sasl(#[from] SaslError),
    #[error("method {0:?} is not valid in the current connection state")]
    UnexpectedMethod(crate::frame::MethodCode),
    #[error("transport failed: {0}")]
    TransportFailure(String),
}

/// Adds "what the engine was doing" context over [`ConnectionInnerError`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum ConnectionStateError {
    #[error("during handshake: {0}")]
    Handshake(#[source] ConnectionInnerError),
    #[error("during SASL negotiation: {0}")]
    Sasl(#[source] ConnectionInnerError),
    #[error("during tune/open negotiation: {0}")]
    Negotiation(#[source] ConnectionInnerError),
    #[error("while open: {0}")]
    Open(#[source] ConnectionInnerError),
}

impl From<ConnectionStateError> for Error {
    fn from(err: ConnectionStateError) -> Self {
        let inner = match &err {
            ConnectionStateError::Handshake(i)
            | ConnectionStateError::Sasl(i)
            | ConnectionStateError::Negotiation(i)
            | ConnectionStateError::Open(i) => i,
        };
        match inner {
            ConnectionInnerError::Handshake(e) => Error::HandshakeMismatch(e.clone()),
            ConnectionInnerError::Sasl(e) => Error::SaslFailure(e.clone()),
            ConnectionInnerError::TransportFailure(msg) => Error::TransportFailure(msg.clone()),
            ConnectionInnerError::UnexpectedMethod(_) => Error::Internal(err.to_string()),
        }
    }
}

/// Public, connection-scoped error exposed from `lib.rs`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    HandshakeMismatch(#[from] HandshakeError),
    #[error(transparent)]
    SaslFailure(#[from] SaslError),
    #[error("transport failed: {0}")]
    TransportFailure(String),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// The `connection.close` code a caller should use when surfacing this
    /// error on the wire (§7).
    pub fn close_code(&self) -> CloseCode {
        match self {
            Error::SaslFailure(_) => CloseCode::ConnectionForced,
            Error::HandshakeMismatch(_) => CloseCode::FramingError,
            Error::Internal(_) => CloseCode::InternalError,
            Error::TransportFailure(_) => CloseCode::InternalError,
        }
    }
}
