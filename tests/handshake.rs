//! §8 scenario 1 (bad protocol header is rejected) and scenario 2 (a valid
//! handshake reaches `connection.open-ok`).

mod common;

use qpid_session_engine::frame::{FrameBody, Method};
use qpid_session_engine::handshake::{ProtocolHandshake, ProtocolHeader};

fn broker() -> ProtocolHandshake {
    ProtocolHandshake::new(ProtocolHeader::new(1, 1, 0, 10))
}

#[tokio::test]
async fn scenario_1_bad_header_is_rejected_with_the_brokers_preferred_header() {
    let handshake = broker();
    let bad = *b"PQMA\0\0\0\0";
    let err = handshake.negotiate(bad).expect_err("bad magic must be rejected");
    assert!(matches!(
        err,
        qpid_session_engine::error::HandshakeError::HeaderMismatch
    ));

    // The caller is expected to send this back and close the transport
    // (§4.1); the handshake itself never retries on the same connection.
    let preferred: [u8; 8] = handshake.preferred().into();
    assert_eq!(&preferred[..4], b"AMQP");
}

#[tokio::test]
async fn scenario_2_valid_handshake_reaches_open() {
    let handshake = broker();
    let header: [u8; 8] = handshake.preferred().into();
    handshake.negotiate(header).expect("matching header is accepted");

    let mut harness = common::spawn_default();
    harness.open().await;

    // The connection is ready to host sessions once open.
    harness.attach(1, "scenario-2").await;
    harness.execution_sync(1).await;
    let completed = harness.recv().await;
    assert!(matches!(
        completed.body,
        FrameBody::Method(Method::SessionCompleted { .. })
    ));
}
