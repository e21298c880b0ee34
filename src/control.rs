//! Control messages exchanged between the acceptor/public handles and the
//! connection/session/channel actors.

use tokio::sync::{mpsc, oneshot};

use crate::error::{ChannelError, SessionError};
use crate::frame::{CloseCode, Method};
use crate::session::{SessionId, SessionState};

/// Sent into a running [`crate::connection::ConnectionEngine`] from its public handle
/// or from the acceptor that spawned it.
pub enum ConnectionControl {
    /// Request a graceful close with an optional reason.
    Close(Option<(CloseCode, String)>),
    /// Ask the engine to report its current connection state.
    QueryState(oneshot::Sender<crate::connection::ConnectionState>),
    /// Force-remove a channel's table entry from outside, independent of the
    /// engine's own auto-cleanup when a session's `session.close` finishes
    /// (see `ChannelMux`'s `finished` relay) — for an administrative caller
    /// that needs a misbehaving channel gone without waiting on its session
    /// to exit on its own.
    DropChannel(u16),
}

/// Sent into a running [`crate::session::engine::SessionEngine`].
pub enum SessionControl {
    /// Bind (or re-bind) this session to a channel, idempotent by name.
    Attach {
        name: Vec<u8>,
        force: bool,
        responder: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    /// Re-bind a previously detached session (handed back by the connection's
    /// registry) and replay unacknowledged sender commands after the peer's
    /// last-known-complete mark.
    Resume {
        state: Box<SessionState>,
        peer_known_complete: u32,
        responder: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    /// Detach the session from its channel without destroying state; the
    /// detached state is handed back so a registry can hold it for `Resume`.
    Detach {
        responder: oneshot::Sender<Option<SessionState>>,
    },
    /// Drain outstanding completions and tear the session down entirely,
    /// returning any final frames that must still reach the peer.
    Close {
        responder: oneshot::Sender<Vec<Method>>,
    },
}

/// Sent by [`crate::channel::ChannelMux`] into a [`crate::session::SessionHandler`]
/// when a channel-scoped error must be surfaced without killing the connection.
pub enum ChannelControl {
    Error(ChannelError),
}

/// Handle for requesting work from a running actor without owning it.
#[derive(Clone)]
pub struct ControlHandle<T> {
    tx: mpsc::Sender<T>,
}

impl<T> ControlHandle<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, msg: T) -> Result<(), mpsc::error::SendError<T>> {
        self.tx.send(msg).await
    }
}

/// A decoded frame and the method it carried, handed from [`crate::channel::ChannelMux`]
/// to the resident session's event loop.
pub struct IncomingCommand {
    pub channel: u16,
    pub method: Method,
}
