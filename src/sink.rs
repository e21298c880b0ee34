//! The `MessageSink` collaborator: queue/exchange routing, binding and message
//! storage are external to this crate (§1). The engine only ever hands a fully
//! assembled message to a sink and waits for an asynchronous completion.

use bytes::Bytes;

use crate::frame::MessageHeader;

/// A fully assembled inbound message, handed to the sink once the last
/// content frame (`eof && eos`) of its frameset has arrived.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub destination: String,
    pub header: MessageHeader,
    pub content: Bytes,
}

/// A one-shot token the sink calls back into to report completion of a
/// message it previously accepted via [`MessageSink::enqueue`]. Calling it
/// more than once, or never, is a logic error on the sink's part; the engine
/// does not re-check.
pub trait CompletionToken: Send + 'static {
    /// Invoked from any thread (the sink's own worker pool, typically) once
    /// the message has been durably stored/routed. Consumes the token.
    fn complete(self: Box<Self>);
}

/// External collaborator that owns queue/exchange routing and message
/// storage. The engine calls [`MessageSink::enqueue`] once per assembled
/// message and never blocks waiting for the result (§5: "the I/O thread
/// never blocks waiting on a store").
pub trait MessageSink: Send + Sync + 'static {
    /// Accept `message` for routing/storage. The sink must eventually invoke
    /// `token.complete()`, from any thread, to signal completion back to the
    /// owning session.
    fn enqueue(&self, message: InboundMessage, token: Box<dyn CompletionToken>);
}

/// A [`MessageSink`] that completes every message synchronously and
/// immediately, on the calling thread. Useful for tests and for embedding
/// this engine where no external store exists.
#[derive(Debug, Default)]
pub struct ImmediateSink;

impl MessageSink for ImmediateSink {
    fn enqueue(&self, _message: InboundMessage, token: Box<dyn CompletionToken>) {
        token.complete();
    }
}
