//! Crate-wide error types: the handshake/channel leaf errors and the top-level
//! `Error` enum aggregating every component's public error type.
//!
//! Connection- and session-scoped errors have their own layered taxonomies in
//! `connection::error` and `session::error` respectively (inner -> state ->
//! public, following the same shape used throughout); this module holds the
//! errors that don't belong to either, plus the glue that lets callers match
//! on one `Error` type regardless of which component raised it.

use crate::frame::CloseCode;

pub use crate::session::error::Error as SessionError;

/// Failure of the pre-connection protocol handshake (§4.1). Always fatal: the
/// caller is expected to emit the broker's preferred header and close the
/// transport, never retry on the same connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandshakeError {
    #[error("protocol header did not match AMQP magic bytes")]
    HeaderMismatch,
    #[error("unsupported protocol class {0}")]
    ProtocolClass(u8),
    #[error("unsupported protocol instance {0}")]
    ProtocolInstance(u8),
    #[error("unsupported protocol major version {0}")]
    ProtocolMajor(u8),
    #[error("unsupported protocol minor version {0}")]
    ProtocolMinor(u8),
}

/// A channel-scoped error (§7): the channel is closed but the connection survives.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("channel {0} is not attached to a session")]
    NotAttached(u16),
    #[error("channel id {0} exceeds the negotiated channel-max")]
    ChannelMaxExceeded(u16),
    #[error("channel {channel} closed: {text}")]
    Closed { channel: u16, code: CloseCode, text: String },
}

/// SASL negotiation failure (§4.2, §7): always fatal, closes with `CONNECTION_FORCED`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SaslError {
    #[error("unsupported SASL mechanism {0:?}")]
    UnsupportedMechanism(String),
    #[error("SASL negotiation rejected: {0}")]
    Rejected(String),
    #[error("a second SASL round was attempted after failure")]
    RepeatedAfterFailure,
}

/// Top-level error aggregating every component's public error, for callers
/// that want one type to match on regardless of which layer failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Sasl(#[from] SaslError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Connection(#[from] crate::connection::error::Error),
    #[error(transparent)]
    Session(#[from] crate::session::error::Error),
    #[error(transparent)]
    Reconnect(#[from] crate::reconnect::ReconnectError),
    /// An invariant the engine relies on was violated; always fatal.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
