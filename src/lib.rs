//! A broker-side AMQP 0-9/0-10 connection and session protocol engine.
//!
//! This crate owns the parts of a message broker that sit between the wire
//! codec and the routing/storage layer: the pre-connection protocol
//! handshake, the connection state machine (including SASL negotiation and
//! channel-max/frame-max/heartbeat tuning), per-channel multiplexing, and the
//! session layer's command numbering, completion tracking and sync barriers.
//! Framing, TLS, queue/exchange routing and message persistence are all
//! external collaborators the engine talks to through the traits in
//! [`session::CommandAdapter`] and [`sink::MessageSink`].
//!
//! # Feature flags
//!
//! default: `[]`
//!
//! - `"acceptor"`: enables [`acceptor::ConnectionAcceptor`], the broker-side
//!   listener surface that bundles the handshake with an engine spawn.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use qpid_session_engine::connection::ConnectionEngineBuilder;
//! use qpid_session_engine::connection::engine::ConnectionEngine;
//! use qpid_session_engine::sasl::SaslServerConfig;
//! use qpid_session_engine::session::{NullCommandAdapter, SessionConfig};
//! use qpid_session_engine::sink::ImmediateSink;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ConnectionEngineBuilder::new().build().unwrap();
//!     let (_control_tx, control_rx) = mpsc::channel(8);
//!     let (_inbound_tx, inbound_rx) = mpsc::channel(8);
//!     let (outbound_tx, mut outbound_rx) = mpsc::channel(8);
//!
//!     let engine = ConnectionEngine::new(
//!         config,
//!         Arc::new(SaslServerConfig::default()),
//!         SessionConfig::default(),
//!         Arc::new(NullCommandAdapter),
//!         Arc::new(ImmediateSink),
//!         control_rx,
//!         inbound_rx,
//!         outbound_tx,
//!     );
//!     engine.spawn();
//!     let _start_frame = outbound_rx.recv().await;
//! }
//! ```

pub(crate) mod config;
pub(crate) mod control;
pub(crate) mod rangeset;
pub(crate) mod util;

pub mod channel;
pub(crate) mod completion;
pub mod connection;
pub mod error;
pub mod flow;
pub mod frame;
pub mod handshake;
pub mod reconnect;
pub mod sasl;
pub mod session;
pub mod sink;

#[cfg_attr(docsrs, doc(cfg(feature = "acceptor")))]
#[cfg(feature = "acceptor")]
pub mod acceptor;

pub use error::{ChannelError, Error, HandshakeError, Result, SaslError, SessionError};

#[cfg(test)]
mod tests {
    //! Crate-level smoke tests exercising the modules together, beyond the
    //! per-module unit tests that cover each engine's internals in isolation.
    use super::*;

    #[test]
    fn public_error_variants_are_reachable() {
        let err: Error = HandshakeError::HeaderMismatch.into();
        assert!(matches!(err, Error::Handshake(HandshakeError::HeaderMismatch)));
    }
}
