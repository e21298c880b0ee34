//! §8 scenario 6: a session is detached while a content message's
//! completion is still being processed by the sink's worker thread. Detach
//! must cancel the in-flight completion so that when the worker "finishes"
//! afterward, it produces no frame rather than mutating a detached session.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use qpid_session_engine::frame::{Frame, FrameBody, Method};
use qpid_session_engine::session::SessionConfig;
use qpid_session_engine::sink::{CompletionToken, InboundMessage, MessageSink};

/// Holds back the completion token for the one message it's handed, so the
/// test can release it on its own schedule rather than at enqueue time.
struct HoldOneSink {
    held: Mutex<Option<Box<dyn CompletionToken>>>,
}

impl HoldOneSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            held: Mutex::new(None),
        })
    }

    fn release(&self) {
        let token = self.held.lock().unwrap().take().expect("a message was enqueued");
        token.complete();
    }
}

impl MessageSink for HoldOneSink {
    fn enqueue(&self, _message: InboundMessage, token: Box<dyn CompletionToken>) {
        *self.held.lock().unwrap() = Some(token);
    }
}

#[tokio::test]
async fn scenario_6_detach_cancels_a_completion_still_in_flight() {
    let sink = HoldOneSink::new();
    let mut harness = common::spawn(SessionConfig::default(), sink.clone());
    harness.open().await;
    harness.attach(1, "scenario-6").await;

    // The message is now sitting in the sink, its token held back as if a
    // worker thread were still storing it.
    harness.transfer(1, "a", b"slow").await;

    harness
        .send(Frame::method(
            1,
            Method::SessionDetach {
                name: Bytes::copy_from_slice(b"scenario-6"),
            },
        ))
        .await;
    let detached = harness.recv().await;
    assert!(matches!(detached.body, FrameBody::Method(Method::SessionDetached { .. })));

    // The worker "finishes" only now, after detach already cancelled it.
    sink.release();
    assert!(
        harness.try_recv_within(Duration::from_millis(100)).await.is_none(),
        "a completion for an already-detached message must produce no frame"
    );

    // The channel's session engine survives detach and accepts a fresh attach.
    harness.attach(1, "scenario-6-again").await;
}
