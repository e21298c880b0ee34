//! §8 scenario 3: two content messages (commands 0 and 1) followed by an
//! `execution.sync` (command 2); command 1's completion arrives before
//! command 0's. The barrier must still resolve as a single batch covering
//! {0, 1, 2}, and nothing may flush while either predecessor is outstanding.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use qpid_session_engine::frame::{FrameBody, Method};
use qpid_session_engine::session::SessionConfig;
use qpid_session_engine::sink::{CompletionToken, InboundMessage, MessageSink};

/// A sink that holds every completion token it's handed until the test
/// explicitly releases it, so the order completions are observed in can be
/// controlled from outside the engine.
struct DeferredSink {
    tokens: Mutex<Vec<Box<dyn CompletionToken>>>,
}

impl DeferredSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            tokens: Mutex::new(Vec::new()),
        })
    }

    /// Releases the token at `index` in arrival order. Callers must release
    /// higher indices before lower ones, since each release removes from the
    /// backing vec.
    fn complete(&self, index: usize) {
        let token = self.tokens.lock().unwrap().remove(index);
        token.complete();
    }
}

impl MessageSink for DeferredSink {
    fn enqueue(&self, _message: InboundMessage, token: Box<dyn CompletionToken>) {
        self.tokens.lock().unwrap().push(token);
    }
}

#[tokio::test]
async fn scenario_3_sync_barrier_survives_out_of_order_completion() {
    let sink = DeferredSink::new();
    let mut harness = common::spawn(SessionConfig::default(), sink.clone());
    harness.open().await;
    harness.attach(1, "scenario-3").await;

    harness.transfer(1, "a", b"one").await; // command 0
    harness.transfer(1, "a", b"two").await; // command 1
    harness.execution_sync(1).await; // command 2

    assert!(
        harness.try_recv_within(Duration::from_millis(50)).await.is_none(),
        "nothing should flush before either content message completes"
    );

    // Complete command 1 first.
    sink.complete(1);
    assert!(
        harness.try_recv_within(Duration::from_millis(50)).await.is_none(),
        "completing only the later command must not flush session.completed"
    );

    // Completing command 0 now must drain 0, 1 and the sync together.
    sink.complete(0);
    let completed = harness.recv().await;
    match completed.body {
        FrameBody::Method(Method::SessionCompleted { commands, .. }) => {
            assert!(commands.contains(0));
            assert!(commands.contains(1));
            assert!(commands.contains(2));
        }
        other => panic!("expected session.completed, got {other:?}"),
    }
}
