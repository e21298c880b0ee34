//! The per-session `tokio` actor (§4.5's final paragraph: "driven as its own
//! actor... a `tokio::select!` loop over inbound frames, its completion
//! scheduler's doorbell, and a control channel"). Grounded directly in the
//! teacher's `session::engine::SessionEngine` event loop shape: a
//! `tokio::select!` over `incoming`/`control` (here with a third arm for the
//! completion doorbell) driving a [`Running`] decision each iteration.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::completion::CompletionScheduler;
use crate::control::SessionControl;
use crate::frame::{DetachCode, Frame, FrameBody, Method};
use crate::util::Running;

use crate::sink::MessageSink;

use super::adapter::CommandAdapter;
use super::error::Error;
use super::handler::SessionHandler;
use super::{SessionConfig, SessionId, SessionName};

/// The handle's half of a spawned [`SessionEngine`]: a control channel and
/// the channel number it is bound to.
pub struct SessionEngineHandle {
    pub channel: u16,
    pub control: mpsc::Sender<SessionControl>,
}

/// Owns one [`SessionHandler`] and the transport plumbing around it. One
/// instance per attached channel; spawned and torn down by the connection's
/// channel table as `session.attach`/`session.detach` come and go.
pub struct SessionEngine {
    handler: SessionHandler,
    config: SessionConfig,
    adapter: Arc<dyn CommandAdapter>,
    sink: Arc<dyn MessageSink>,
    scheduler: Arc<CompletionScheduler>,

    control: mpsc::Receiver<SessionControl>,
    inbound: mpsc::Receiver<Frame>,
    doorbell: mpsc::Receiver<()>,
    outbound: mpsc::Sender<Method>,
}

impl SessionEngine {
    /// Builds a new engine bound to `channel`, with its own completion
    /// doorbell (capacity 1, per [`CompletionScheduler`]'s "single wakeup per
    /// batch" contract).
    pub fn new(
        channel: u16,
        config: SessionConfig,
        adapter: Arc<dyn CommandAdapter>,
        sink: Arc<dyn MessageSink>,
        control: mpsc::Receiver<SessionControl>,
        inbound: mpsc::Receiver<Frame>,
        outbound: mpsc::Sender<Method>,
    ) -> Self {
        let (doorbell_tx, doorbell) = mpsc::channel(1);
        Self {
            handler: SessionHandler::new(channel),
            config,
            adapter,
            sink,
            scheduler: Arc::new(CompletionScheduler::new(doorbell_tx)),
            control,
            inbound,
            doorbell,
            outbound,
        }
    }

    pub fn channel(&self) -> u16 {
        self.handler.channel()
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.event_loop())
    }

    async fn send_all(&self, methods: Vec<Method>) -> Result<(), Error> {
        for method in methods {
            if self.outbound.send(method).await.is_err() {
                // The connection/channel mux has gone away; nothing further
                // can be delivered, so give up on this batch.
                return Err(Error::Internal("outbound channel closed".into()));
            }
        }
        Ok(())
    }

    /// `session.attach`/`session.detach` arrive as ordinary frames, but they
    /// are what create and release the `SessionState` the rest of
    /// `on_frame`'s dispatch depends on — neither can be routed through
    /// `SessionHandler::on_frame` like a regular command, so both are
    /// handled here, the same way `ConnectionEngine::on_connection_method`
    /// answers protocol-level methods directly rather than forwarding them
    /// inward. Detaching leaves the engine running: §4.4's attach is
    /// idempotent-by-name and re-attaching a different name on the same
    /// channel simply replaces the binding, so there is no reason to tear
    /// the task down on detach.
    async fn on_inbound(&mut self, frame: Frame) -> Result<Running, Error> {
        let Frame {
            channel,
            track,
            flags,
            frame_type,
            body,
        } = frame;
        match body {
            FrameBody::Method(Method::SessionAttach { name, force }) => {
                self.do_attach(name.to_vec(), force)?;
                self.send_all(vec![Method::SessionAttached { name }]).await?;
                Ok(Running::Continue)
            }
            FrameBody::Method(Method::SessionDetach { name }) => {
                self.handler.detach();
                self.send_all(vec![Method::SessionDetached {
                    name,
                    code: DetachCode::Closed,
                }])
                .await?;
                Ok(Running::Continue)
            }
            body => {
                let frame = Frame {
                    channel,
                    track,
                    flags,
                    frame_type,
                    body,
                };
                match self.handler.on_frame(frame) {
                    Ok(methods) => {
                        self.send_all(methods).await?;
                        Ok(Running::Continue)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Drains everything the [`CompletionScheduler`] has collected since the
    /// last doorbell and folds each completion back into the attached
    /// [`super::state::SessionState`] (§4.5 "Content-message completion").
    async fn on_doorbell(&mut self) -> Result<Running, Error> {
        let pending = self.scheduler.drain();
        let Some(state) = self.handler.state_mut() else {
            return Ok(Running::Continue);
        };
        let mut out = Vec::new();
        for (handle, _outcome) in pending {
            out.extend(state.on_message_completed(handle));
        }
        self.send_all(out).await?;
        Ok(Running::Continue)
    }

    async fn on_control(&mut self, control: SessionControl) -> Result<Running, Error> {
        match control {
            SessionControl::Attach {
                name,
                force,
                responder,
            } => {
                let result = self.do_attach(name, force);
                let _ = responder.send(result);
                Ok(Running::Continue)
            }
            SessionControl::Resume {
                state,
                peer_known_complete,
                responder,
            } => {
                let id = state.id();
                let replay = self.handler.resume(*state, peer_known_complete);
                if let Err(err) = self.send_all(replay).await {
                    let _ = responder.send(Err(err.clone()));
                    return Err(err);
                }
                let _ = responder.send(Ok(id));
                Ok(Running::Continue)
            }
            SessionControl::Detach { responder } => {
                let detached = self.handler.detach();
                let _ = responder.send(detached);
                Ok(Running::Continue)
            }
            SessionControl::Close { responder } => {
                // Unlike Resume's replay, the final frames here are handed to
                // the caller rather than sent with `send_all`: close has no
                // wire frame of its own to answer (there is no inbound
                // `session.close`), so whatever orchestrates this shutdown
                // (this crate has no connection-level session registry, see
                // DESIGN.md) owns deciding whether the dying transport is
                // still worth writing to.
                let out = self.handler.close();
                let _ = responder.send(out);
                Ok(Running::Stop)
            }
        }
    }

    fn do_attach(&mut self, name: Vec<u8>, force: bool) -> Result<SessionId, Error> {
        let name = SessionName::new(name);
        if !force {
            if let Some(existing) = self.handler.state() {
                if existing.name() != &name {
                    return Err(Error::Internal(format!(
                        "channel {} already bound to a different session",
                        self.handler.channel()
                    )));
                }
            }
        }
        let state = self.handler.attach(
            name,
            self.config.clone(),
            self.adapter.clone(),
            self.sink.clone(),
            self.scheduler.clone(),
        );
        Ok(state.id())
    }

    #[tracing::instrument(name = "SessionEngine::event_loop", skip(self), fields(channel = self.handler.channel()))]
    async fn event_loop(mut self) {
        loop {
            let result = tokio::select! {
                frame = self.inbound.recv() => {
                    match frame {
                        Some(frame) => self.on_inbound(frame).await,
                        None => Ok(Running::Stop),
                    }
                }
                _ = self.doorbell.recv() => self.on_doorbell().await,
                control = self.control.recv() => {
                    match control {
                        Some(control) => self.on_control(control).await,
                        None => Ok(Running::Stop),
                    }
                }
            };

            match result {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break,
                Err(err) => {
                    tracing::warn!("session engine stopping on error: {:?}", err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFlags, FrameType};
    use crate::sink::ImmediateSink;
    use std::time::Duration;

    fn spawn_engine(channel: u16) -> (mpsc::Sender<SessionControl>, mpsc::Sender<Frame>, mpsc::Receiver<Method>) {
        let (control_tx, control_rx) = mpsc::channel(8);
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let engine = SessionEngine::new(
            channel,
            SessionConfig::default(),
            Arc::new(super::super::adapter::NullCommandAdapter),
            Arc::new(ImmediateSink),
            control_rx,
            inbound_rx,
            outbound_tx,
        );
        engine.spawn();
        (control_tx, inbound_tx, outbound_rx)
    }

    #[tokio::test]
    async fn attach_then_execution_sync_flushes_session_completed() {
        let (control, inbound, mut outbound) = spawn_engine(1);

        let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
        control
            .send(SessionControl::Attach {
                name: b"test".to_vec(),
                force: false,
                responder: resp_tx,
            })
            .await
            .unwrap();
        resp_rx.await.unwrap().expect("attach succeeds");

        inbound
            .send(Frame {
                channel: 1,
                track: 0,
                flags: FrameFlags::solo(),
                frame_type: FrameType::Method,
                body: crate::frame::FrameBody::Method(Method::ExecutionSync),
            })
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .expect("engine responds")
            .expect("channel stays open");
        assert!(matches!(frame, Method::SessionCompleted { .. }));
    }

    #[tokio::test]
    async fn wire_session_attach_frame_actually_attaches_and_replies() {
        let (_control, inbound, mut outbound) = spawn_engine(1);

        inbound
            .send(Frame::method(
                1,
                Method::SessionAttach {
                    name: bytes::Bytes::from_static(b"test"),
                    force: false,
                },
            ))
            .await
            .unwrap();

        let attached = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .expect("engine responds")
            .expect("channel stays open");
        match attached {
            Method::SessionAttached { name } => assert_eq!(&name[..], b"test"),
            other => panic!("expected session.attached, got {other:?}"),
        }

        // The session now has real state, so a command frame completes normally.
        inbound
            .send(Frame::method(1, Method::ExecutionSync))
            .await
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .expect("engine responds")
            .expect("channel stays open");
        assert!(matches!(frame, Method::SessionCompleted { .. }));
    }

    #[tokio::test]
    async fn wire_session_detach_replies_and_leaves_the_engine_running() {
        let (_control, inbound, mut outbound) = spawn_engine(1);

        inbound
            .send(Frame::method(
                1,
                Method::SessionAttach {
                    name: bytes::Bytes::from_static(b"test"),
                    force: false,
                },
            ))
            .await
            .unwrap();
        outbound.recv().await.unwrap();

        inbound
            .send(Frame::method(
                1,
                Method::SessionDetach {
                    name: bytes::Bytes::from_static(b"test"),
                },
            ))
            .await
            .unwrap();
        let detached = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .expect("engine responds")
            .expect("channel stays open");
        assert!(matches!(
            detached,
            Method::SessionDetached {
                code: crate::frame::DetachCode::Closed,
                ..
            }
        ));

        // The engine task itself survives detach and accepts a fresh attach.
        inbound
            .send(Frame::method(
                1,
                Method::SessionAttach {
                    name: bytes::Bytes::from_static(b"test-2"),
                    force: false,
                },
            ))
            .await
            .unwrap();
        let reattached = tokio::time::timeout(Duration::from_secs(1), outbound.recv())
            .await
            .expect("engine responds")
            .expect("channel stays open");
        match reattached {
            Method::SessionAttached { name } => assert_eq!(&name[..], b"test-2"),
            other => panic!("expected session.attached, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_without_attach_returns_empty_and_stops() {
        let (control, _inbound, _outbound) = spawn_engine(2);
        let (resp_tx, resp_rx) = tokio::sync::oneshot::channel();
        control
            .send(SessionControl::Close { responder: resp_tx })
            .await
            .unwrap();
        let out = resp_rx.await.unwrap();
        assert!(out.is_empty());
    }
}
