//! Per-channel binding between transport frames and a [`SessionState`] (§4.4).

use std::sync::Arc;

use crate::completion::CompletionScheduler;
use crate::frame::{Frame, Method};
use crate::rangeset::RangeSet;
use crate::sink::MessageSink;

use super::adapter::CommandAdapter;
use super::error::{Error, SessionException};
use super::{SessionConfig, SessionName, SessionState};

/// Binds one channel to at most one [`SessionState`] (§3, §4.4). Tracks the
/// `ignoring` flag set while a close is in flight so stray frames from the
/// peer are silently dropped until the close round-trips.
pub struct SessionHandler {
    channel: u16,
    state: Option<SessionState>,
    ignoring: bool,
}

impl SessionHandler {
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            state: None,
            ignoring: false,
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn is_ignoring(&self) -> bool {
        self.ignoring
    }

    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    pub fn state_mut(&mut self) -> Option<&mut SessionState> {
        self.state.as_mut()
    }

    /// `attach(name)` (§4.4): idempotent by name. Re-attaching the same
    /// name while already bound to it is a no-op, matching §8's idempotence
    /// property; attaching a different name replaces the binding.
    pub fn attach(
        &mut self,
        name: SessionName,
        config: SessionConfig,
        adapter: Arc<dyn CommandAdapter>,
        sink: Arc<dyn MessageSink>,
        scheduler: Arc<CompletionScheduler>,
    ) -> &mut SessionState {
        let needs_new = match &self.state {
            Some(existing) => existing.name() != &name,
            None => true,
        };
        if needs_new {
            self.state = Some(SessionState::new(name, config, adapter, sink, scheduler));
        }
        self.ignoring = false;
        self.state.as_mut().expect("just attached")
    }

    /// `resume(sessionId)` (§4.4): re-binds a previously detached
    /// [`SessionState`] and returns the replay of sender-side commands
    /// after the peer's last-known-complete mark.
    pub fn resume(&mut self, detached: SessionState, peer_known_complete: u32) -> Vec<Method> {
        let replay = detached.replay_after(peer_known_complete);
        self.state = Some(detached);
        self.ignoring = false;
        replay
    }

    /// `detach()` (§4.4): marks the session unattached and hands the state
    /// back to the caller (typically a connection-level registry keyed by
    /// [`SessionName`]) for a later `resume`. Cancels every in-flight
    /// completion first (§5: "Detaching a session cancels every in-flight
    /// IncompleteRcvMsg") so a worker thread's completion callback arriving
    /// after detach is a no-op rather than mutating a detached session.
    pub fn detach(&mut self) -> Option<SessionState> {
        self.ignoring = true;
        if let Some(state) = self.state.as_mut() {
            state.cancel_outstanding();
        }
        self.state.take()
    }

    /// `close()` (§4.4): cancels every in-flight completion (§5), drains
    /// whatever had already completed, returns any final
    /// `session.completed`/`message.accept` frames, and releases the
    /// binding entirely. A second call with no attached state is a no-op
    /// per §8's idempotence property.
    pub fn close(&mut self) -> Vec<Method> {
        match self.state.as_mut() {
            Some(state) => {
                state.cancel_outstanding();
                let out = state.flush_final();
                self.state = None;
                self.ignoring = false;
                out
            }
            None => Vec::new(),
        }
    }

    /// Routes one inbound frame, honoring the `ignoring` flag (§4.4: "If a
    /// frame arrives while ignoring=true, drop it silently").
    pub fn on_frame(&mut self, frame: Frame) -> Result<Vec<Method>, Error> {
        if self.ignoring {
            return Ok(Vec::new());
        }
        match self.state.as_mut() {
            Some(state) => Ok(state.on_frame(frame)),
            None => Err(Error::NotAttached(SessionName::new(&b""[..]))),
        }
    }

    /// Surfaces a session-scoped exception (§7 `SessionException`):
    /// notifies the listener (folded here into the returned error) and
    /// begins ignoring further frames until the close round-trips.
    pub fn raise_exception(&mut self, exception: SessionException) -> Error {
        self.ignoring = true;
        Error::Exception(exception)
    }

    /// Sender-side commands the peer has confirmed (§4.5).
    pub fn sender_completed(&mut self, commands: &RangeSet) {
        if let Some(state) = self.state.as_mut() {
            state.sender_completed(commands);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionScheduler;
    use crate::frame::{FrameBody, FrameFlags, FrameType};
    use crate::session::adapter::NullCommandAdapter;
    use crate::sink::{CompletionToken, InboundMessage};

    /// A sink that never calls the completion token, simulating a worker
    /// thread still storing the message when detach happens.
    struct NeverCompletes;
    impl MessageSink for NeverCompletes {
        fn enqueue(&self, _message: InboundMessage, _token: Box<dyn CompletionToken>) {}
    }

    fn content_frames(destination: &str) -> (Frame, Frame) {
        let transfer = Frame {
            channel: 1,
            track: 0,
            flags: FrameFlags::solo(),
            frame_type: FrameType::Method,
            body: FrameBody::Method(Method::MessageTransfer {
                destination: destination.into(),
                requires_accept: false,
            }),
        };
        let content = Frame {
            channel: 1,
            track: 0,
            flags: FrameFlags {
                bof: false,
                eof: true,
                bos: true,
                eos: true,
            },
            frame_type: FrameType::Content,
            body: FrameBody::Content(bytes::Bytes::from_static(b"x")),
        };
        (transfer, content)
    }

    #[test]
    fn attach_is_idempotent_by_name() {
        let mut handler = SessionHandler::new(1);
        let scheduler = Arc::new(CompletionScheduler::new(tokio::sync::mpsc::channel(1).0));
        let name = SessionName::new(&b"sess"[..]);
        let id_before = handler
            .attach(
                name.clone(),
                SessionConfig::default(),
                Arc::new(NullCommandAdapter),
                Arc::new(NeverCompletes),
                scheduler.clone(),
            )
            .id();
        let id_after = handler
            .attach(
                name,
                SessionConfig::default(),
                Arc::new(NullCommandAdapter),
                Arc::new(NeverCompletes),
                scheduler,
            )
            .id();
        assert_eq!(id_before, id_after);
    }

    #[test]
    fn repeated_close_with_no_attached_state_is_a_no_op() {
        let mut handler = SessionHandler::new(1);
        assert!(handler.close().is_empty());
        assert!(handler.close().is_empty());
    }

    #[test]
    fn detach_cancels_in_flight_completion_so_it_becomes_a_no_op() {
        let mut handler = SessionHandler::new(1);
        let scheduler = Arc::new(CompletionScheduler::new(tokio::sync::mpsc::channel(1).0));
        handler.attach(
            SessionName::new(&b"sess"[..]),
            SessionConfig::default(),
            Arc::new(NullCommandAdapter),
            Arc::new(NeverCompletes),
            scheduler.clone(),
        );
        let (transfer, content) = content_frames("a");
        handler.on_frame(transfer).unwrap();
        handler.on_frame(content).unwrap();

        let handle = *handler
            .state()
            .unwrap()
            .incomplete_handles_for_test()
            .first()
            .expect("message should be outstanding");

        let detached = handler.detach().expect("session was attached");
        assert!(detached.incomplete_handles_for_test().is_empty());

        // The worker thread "finishes" only after detach; this must be a
        // silent no-op rather than mutating the now-detached session.
        scheduler.schedule(handle, crate::completion::CompletionOutcome::Completed);
        assert!(scheduler.drain().is_empty());
    }

    #[test]
    fn ignoring_drops_frames_until_reattach() {
        let mut handler = SessionHandler::new(1);
        let scheduler = Arc::new(CompletionScheduler::new(tokio::sync::mpsc::channel(1).0));
        handler.attach(
            SessionName::new(&b"sess"[..]),
            SessionConfig::default(),
            Arc::new(NullCommandAdapter),
            Arc::new(NeverCompletes),
            scheduler.clone(),
        );
        handler.detach();
        assert!(handler.is_ignoring());
        let (transfer, _content) = content_frames("a");
        let out = handler.on_frame(transfer).unwrap();
        assert!(out.is_empty());

        handler.attach(
            SessionName::new(&b"sess"[..]),
            SessionConfig::default(),
            Arc::new(NullCommandAdapter),
            Arc::new(NeverCompletes),
            scheduler,
        );
        assert!(!handler.is_ignoring());
    }
}
