//! Shared harness for the end-to-end scenarios in SPEC_FULL.md §8: drives a
//! full `ConnectionEngine` over its public `Frame` channels instead of a real
//! socket, the way the teacher's own `tests/common.rs` spins up a real broker
//! container for its connection tests but hands back a thin handle either way.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use qpid_session_engine::connection::engine::ConnectionEngine;
use qpid_session_engine::connection::ConnectionConfig;
use qpid_session_engine::frame::{Frame, FrameBody, FrameFlags, FrameType, Method};
use qpid_session_engine::sasl::SaslServerConfig;
use qpid_session_engine::session::{NullCommandAdapter, SessionConfig};
use qpid_session_engine::sink::MessageSink;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// A connection engine driven purely through its public inbound/outbound
/// `Frame` channels. `_control` just needs to stay alive for the engine's
/// control channel to stay open for the harness's lifetime; its type is
/// crate-private, so it's kept type-erased rather than named.
pub struct Harness {
    pub inbound: mpsc::Sender<Frame>,
    pub outbound: mpsc::Receiver<Frame>,
    _control: Box<dyn std::any::Any + Send>,
}

impl Harness {
    pub async fn recv(&mut self) -> Frame {
        tokio::time::timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("connection produced a frame before the timeout")
            .expect("outbound channel stays open")
    }

    pub async fn try_recv_within(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.outbound.recv()).await.ok().flatten()
    }

    pub async fn send(&self, frame: Frame) {
        self.inbound.send(frame).await.expect("connection accepts the frame");
    }

    /// Drives the handshake (`start-ok` with ANONYMOUS, `tune-ok`, `open`) to
    /// `connection.open-ok`, discarding the frames along the way.
    pub async fn open(&mut self) {
        let _start = self.recv().await;
        self.send(Frame::method(
            0,
            Method::ConnectionStartOk {
                mechanism: "ANONYMOUS".into(),
                response: Bytes::new(),
                locale: "en_US".into(),
            },
        ))
        .await;
        let _tune = self.recv().await;
        self.send(Frame::method(
            0,
            Method::ConnectionTuneOk {
                channel_max: 0,
                max_frame_size: 0,
                heartbeat: 0,
            },
        ))
        .await;
        self.send(Frame::method(0, Method::ConnectionOpen { virtual_host: None }))
            .await;
        let _open_ok = self.recv().await;
    }

    /// Attaches a session on `channel`, consuming the `session.attached` reply.
    pub async fn attach(&mut self, channel: u16, name: &str) {
        self.send(Frame::method(
            channel,
            Method::SessionAttach {
                name: Bytes::copy_from_slice(name.as_bytes()),
                force: false,
            },
        ))
        .await;
        let attached = self.recv().await;
        assert!(matches!(attached.body, FrameBody::Method(Method::SessionAttached { .. })));
    }

    /// Sends a solo `message.transfer` immediately followed by its one
    /// content frame (`bof=false, eof=true` closing the frameset opened by
    /// the method frame's own `bof=true`).
    pub async fn transfer(&self, channel: u16, destination: &str, payload: &[u8]) {
        self.send(Frame::method(
            channel,
            Method::MessageTransfer {
                destination: destination.into(),
                requires_accept: false,
            },
        ))
        .await;
        self.send(Frame {
            channel,
            track: 0,
            flags: FrameFlags {
                bof: false,
                eof: true,
                bos: true,
                eos: true,
            },
            frame_type: FrameType::Content,
            body: FrameBody::Content(Bytes::copy_from_slice(payload)),
        })
        .await;
    }

    pub async fn execution_sync(&self, channel: u16) {
        self.send(Frame::method(channel, Method::ExecutionSync)).await;
    }
}

pub fn spawn(session_config: SessionConfig, sink: Arc<dyn MessageSink>) -> Harness {
    let (control_tx, control_rx) = mpsc::channel(8);
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let engine = ConnectionEngine::new(
        ConnectionConfig::default(),
        Arc::new(SaslServerConfig::default()),
        session_config,
        Arc::new(NullCommandAdapter),
        sink,
        control_rx,
        inbound_rx,
        outbound_tx,
    );
    engine.spawn();
    Harness {
        inbound: inbound_tx,
        outbound: outbound_rx,
        _control: Box::new(control_tx),
    }
}

pub fn spawn_default() -> Harness {
    spawn(SessionConfig::default(), Arc::new(qpid_session_engine::sink::ImmediateSink))
}
