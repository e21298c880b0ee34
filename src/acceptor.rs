//! Broker-side listener surface: the protocol handshake plus a
//! [`ConnectionEngine`] spawn, bundled for a caller that owns the actual
//! `TcpListener`/TLS/codec stack (all external collaborators per the crate's
//! transport boundary). Gated behind the `acceptor` feature.
//!
//! Grounded in the teacher's `acceptor::connection::ConnectionAcceptor`
//! (handshake-then-spawn shape), adapted to this crate's boundary: the caller
//! hands over the raw 8-byte opening header plus a pair of `Frame` channels
//! already produced by its own transport/codec layer, rather than an
//! `AsyncRead + AsyncWrite` stream.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::engine::ConnectionEngine;
use crate::connection::{ConnectionConfig, ConnectionState};
use crate::control::ConnectionControl;
use crate::frame::Frame;
use crate::handshake::{ProtocolHandshake, ProtocolHeader};
use crate::sasl::SaslServerConfig;
use crate::session::{CommandAdapter, SessionConfig};
use crate::sink::MessageSink;

/// Returned when the peer's opening bytes don't match what this broker
/// speaks; the caller should send [`AcceptError::preferred`] back and close
/// the transport (§4.1).
#[derive(Debug, Clone, thiserror::Error)]
#[error("handshake rejected: {source}")]
pub struct AcceptError {
    #[source]
    pub source: crate::error::HandshakeError,
    preferred: ProtocolHeader,
}

impl AcceptError {
    pub fn preferred(&self) -> ProtocolHeader {
        self.preferred
    }
}

/// A spawned connection's control surface: the caller keeps `control` to
/// request a close or query the connection's state, and `handle` to await
/// the engine task's completion.
pub struct AcceptedConnection {
    pub control: mpsc::Sender<ConnectionControl>,
    pub handle: JoinHandle<()>,
}

/// Accepts incoming connections with a fixed configuration and set of
/// collaborators (§4.1 + §4.2 assembled together).
pub struct ConnectionAcceptor {
    handshake: ProtocolHandshake,
    connection_config: ConnectionConfig,
    sasl_config: Arc<SaslServerConfig>,
    session_config: SessionConfig,
    adapter: Arc<dyn CommandAdapter>,
    sink: Arc<dyn MessageSink>,
    control_buffer: usize,
}

impl ConnectionAcceptor {
    pub fn builder() -> ConnectionAcceptorBuilder {
        ConnectionAcceptorBuilder::default()
    }

    /// Checks the peer's opening bytes, and if they match, spawns a
    /// [`ConnectionEngine`] wired to the given `inbound`/`outbound` frame
    /// channels.
    pub fn accept(
        &self,
        header: [u8; 8],
        inbound: mpsc::Receiver<Frame>,
        outbound: mpsc::Sender<Frame>,
    ) -> Result<AcceptedConnection, AcceptError> {
        self.handshake.negotiate(header).map_err(|source| AcceptError {
            source,
            preferred: self.handshake.preferred(),
        })?;

        let (control_tx, control_rx) = mpsc::channel(self.control_buffer);
        let engine = ConnectionEngine::new(
            self.connection_config.clone(),
            self.sasl_config.clone(),
            self.session_config.clone(),
            self.adapter.clone(),
            self.sink.clone(),
            control_rx,
            inbound,
            outbound,
        );
        let handle = engine.spawn();
        Ok(AcceptedConnection {
            control: control_tx,
            handle,
        })
    }

    /// The header this broker will send back after a handshake mismatch.
    pub fn preferred_header(&self) -> ProtocolHeader {
        self.handshake.preferred()
    }
}

/// Builder for [`ConnectionAcceptor`]. Every sub-config has its own
/// independently-validated builder (`ConnectionEngineBuilder`,
/// `SessionEngineBuilder`, SASL's own construction); this one just composes
/// already-validated pieces, so it doesn't need the zero-rejecting
/// `Uninitialized`/`Initialized` typestate the others use.
pub struct ConnectionAcceptorBuilder {
    handshake: ProtocolHandshake,
    connection_config: ConnectionConfig,
    sasl_config: Arc<SaslServerConfig>,
    session_config: SessionConfig,
    adapter: Option<Arc<dyn CommandAdapter>>,
    sink: Option<Arc<dyn MessageSink>>,
    control_buffer: usize,
}

impl Default for ConnectionAcceptorBuilder {
    fn default() -> Self {
        Self {
            handshake: ProtocolHandshake::new(ProtocolHeader::new(1, 1, 0, 10)),
            connection_config: ConnectionConfig::default(),
            sasl_config: Arc::new(SaslServerConfig::default()),
            session_config: SessionConfig::default(),
            adapter: None,
            sink: None,
            control_buffer: 16,
        }
    }
}

impl ConnectionAcceptorBuilder {
    pub fn protocol_header(mut self, header: ProtocolHeader) -> Self {
        self.handshake = ProtocolHandshake::new(header);
        self
    }

    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection_config = config;
        self
    }

    pub fn sasl_config(mut self, config: SaslServerConfig) -> Self {
        self.sasl_config = Arc::new(config);
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn CommandAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn control_buffer(mut self, size: usize) -> Self {
        self.control_buffer = size;
        self
    }

    /// Panics-free only once `adapter` and `sink` have been supplied; both
    /// are mandatory collaborators with no sensible default.
    pub fn build(self) -> Result<ConnectionAcceptor, &'static str> {
        Ok(ConnectionAcceptor {
            handshake: self.handshake,
            connection_config: self.connection_config,
            sasl_config: self.sasl_config,
            session_config: self.session_config,
            adapter: self.adapter.ok_or("adapter is required")?,
            sink: self.sink.ok_or("sink is required")?,
            control_buffer: self.control_buffer,
        })
    }
}

/// Queries whether a connection produced by this acceptor is still open
/// (convenience for callers holding only the control sender).
pub async fn query_state(control: &mpsc::Sender<ConnectionControl>) -> Option<ConnectionState> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    control.send(ConnectionControl::QueryState(tx)).await.ok()?;
    rx.await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::adapter::NullCommandAdapter;
    use crate::sink::ImmediateSink;
    use std::time::Duration;

    fn acceptor() -> ConnectionAcceptor {
        ConnectionAcceptor::builder()
            .adapter(Arc::new(NullCommandAdapter))
            .sink(Arc::new(ImmediateSink))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn matching_header_spawns_an_engine() {
        let acceptor = acceptor();
        let header: [u8; 8] = acceptor.preferred_header().into();
        let (_inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(8);

        let accepted = acceptor.accept(header, inbound_rx, outbound_tx).unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            frame.body,
            crate::frame::FrameBody::Method(crate::frame::Method::ConnectionStart { .. })
        ));
        accepted.handle.abort();
    }

    #[test]
    fn mismatched_header_is_rejected_with_the_preferred_header() {
        let acceptor = acceptor();
        let bad = *b"PQMA\x01\x01\x00\x0a";
        let (_inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, _outbound_rx) = mpsc::channel(8);
        let err = acceptor.accept(bad, inbound_rx, outbound_tx).unwrap_err();
        assert_eq!(err.preferred(), acceptor.preferred_header());
    }

    #[test]
    fn build_without_adapter_fails() {
        let err = ConnectionAcceptorBuilder::default()
            .sink(Arc::new(ImmediateSink))
            .build()
            .unwrap_err();
        assert_eq!(err, "adapter is required");
    }
}
