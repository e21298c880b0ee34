//! The pure command/completion state machine (§4.5). Deliberately free of
//! `tokio`/locking/IO so the ordering and completion invariants in §8 can be
//! property-tested without a runtime; [`crate::session::engine::SessionEngine`]
//! is the thin async shell that drives this from frames and a
//! [`crate::completion::CompletionScheduler`] doorbell.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::completion::{CompletionHandle, CompletionOutcome, CompletionScheduler};
use crate::frame::{ExecutionErrorCode, Frame, FrameBody, MessageHeader, Method};
use crate::rangeset::RangeSet;
use crate::sink::{CompletionToken, InboundMessage, MessageSink};

use super::adapter::{CommandAdapter, CommandError};
use super::{CommandPoint, SessionConfig, SessionId, SessionName};

/// A message-in-flight record (§3 `IncompleteRcvMsg`). Holds exactly the
/// back-reference needed to fold a completion back into `receiverCompleted`;
/// the message body itself was already handed to the sink.
struct IncompleteRcvMsgRecord {
    command_id: u32,
    requires_accept: bool,
    sync: bool,
}

/// In-progress assembly of one content-bearing command's frameset.
struct Assembly {
    command_id: u32,
    destination: String,
    requires_accept: bool,
    header: Option<MessageHeader>,
    buffer: BytesMut,
}

/// The token handed to a [`MessageSink`]; calling it schedules a completion
/// on the owning session's [`CompletionScheduler`] from whatever thread the
/// sink chooses to call back from.
struct SchedulingToken {
    scheduler: Arc<CompletionScheduler>,
    handle: CompletionHandle,
}

impl CompletionToken for SchedulingToken {
    fn complete(self: Box<Self>) {
        self.scheduler
            .schedule(self.handle, CompletionOutcome::Completed);
    }
}

/// The central per-session entity (§3, §4.5). Not `Clone`: exactly one
/// `SessionHandler`/`SessionEngine` owns a given instance at a time, and it
/// migrates by value across detach/resume rather than being shared.
pub struct SessionState {
    id: SessionId,
    name: SessionName,
    config: SessionConfig,

    adapter: Arc<dyn CommandAdapter>,
    sink: Arc<dyn MessageSink>,
    scheduler: Arc<CompletionScheduler>,

    /// Next id this session will assign to an inbound command (receiver
    /// direction high-water mark, §3 `receiverHigh` + 1).
    receiver_next: u32,
    /// Ids that have completed. The complement of this set up to
    /// `receiver_next` is `receiverIncomplete`; `lowest_missing_from(0)` is
    /// the "known-complete" watermark.
    receiver_completed: RangeSet,
    /// Ids requiring `message.accept`, pending the next flush.
    accepted: RangeSet,
    /// FIFO of `execution.sync` ids deferred behind earlier incomplete commands.
    pending_syncs: VecDeque<u32>,
    /// In-flight content messages, keyed by completion handle. Handles
    /// themselves are allocated by `scheduler` rather than counted here, so
    /// they stay unique across a detach/resume cycle (see
    /// `CompletionScheduler::next_handle`).
    incomplete_rcv_msgs: HashMap<CompletionHandle, IncompleteRcvMsgRecord>,
    assembling: Option<Assembly>,

    /// Sender-direction cursor (§3 `commandPoint`).
    command_point: CommandPoint,
    /// Sent command ids the peer hasn't yet reported complete.
    sender_incomplete: RangeSet,
    /// Sent commands kept for `resume`'s replay, oldest-first, bounded by
    /// `config.replay_buffer_size`.
    replay_buffer: VecDeque<(u32, Method)>,

    flow: crate::flow::FlowController,
}

impl SessionState {
    pub fn new(
        name: SessionName,
        config: SessionConfig,
        adapter: Arc<dyn CommandAdapter>,
        sink: Arc<dyn MessageSink>,
        scheduler: Arc<CompletionScheduler>,
    ) -> Self {
        let flow = crate::flow::FlowController::new(config.flow);
        Self {
            id: SessionId::new(),
            name,
            config,
            adapter,
            sink,
            scheduler,
            receiver_next: 0,
            receiver_completed: RangeSet::new(),
            accepted: RangeSet::new(),
            pending_syncs: VecDeque::new(),
            incomplete_rcv_msgs: HashMap::new(),
            assembling: None,
            command_point: CommandPoint::default(),
            sender_incomplete: RangeSet::new(),
            replay_buffer: VecDeque::new(),
            flow,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn flow_mut(&mut self) -> &mut crate::flow::FlowController {
        &mut self.flow
    }

    /// Outstanding completion handles, for tests outside this module that
    /// need to observe `cancel_outstanding`'s effect without reaching into
    /// a private field.
    #[cfg(test)]
    pub(crate) fn incomplete_handles_for_test(&self) -> Vec<CompletionHandle> {
        self.incomplete_rcv_msgs.keys().copied().collect()
    }

    /// Whether every command this session has received, and every command
    /// it has sent, has completed (§8: "after draining: receiverIncomplete =
    /// ∅, senderIncomplete = ∅").
    pub fn is_drained(&self) -> bool {
        self.receiver_completed.lowest_missing_from(0) == self.receiver_next
            && self.sender_incomplete.is_empty()
            && self.incomplete_rcv_msgs.is_empty()
    }

    /// Entry point for one inbound [`Frame`] already routed to this session
    /// by `ChannelMux`/`SessionHandler` (§4.5 "Inbound frame handling").
    pub fn on_frame(&mut self, frame: Frame) -> Vec<Method> {
        match frame.body {
            FrameBody::Method(method) if method.is_content_bearing() => {
                self.begin_assembly(method);
                Vec::new()
            }
            FrameBody::Method(method) => {
                let id = self.allocate_receiver_id();
                self.handle_command(method, id)
            }
            FrameBody::Header(header) => {
                if let Some(assembly) = self.assembling.as_mut() {
                    assembly.header = Some(header);
                }
                Vec::new()
            }
            FrameBody::Content(bytes) => self.append_content(bytes, frame.flags),
            FrameBody::Heartbeat => Vec::new(),
        }
    }

    fn allocate_receiver_id(&mut self) -> u32 {
        let id = self.receiver_next;
        self.receiver_next = self.receiver_next.wrapping_add(1);
        id
    }

    fn begin_assembly(&mut self, method: Method) {
        let id = self.allocate_receiver_id();
        if let Method::MessageTransfer {
            destination,
            requires_accept,
        } = method
        {
            self.assembling = Some(Assembly {
                command_id: id,
                destination,
                requires_accept,
                header: None,
                buffer: BytesMut::new(),
            });
        }
    }

    fn append_content(&mut self, bytes: Bytes, flags: crate::frame::FrameFlags) -> Vec<Method> {
        if let Some(assembly) = self.assembling.as_mut() {
            assembly.buffer.extend_from_slice(&bytes);
        }
        if !(flags.eof && flags.eos) {
            return Vec::new();
        }
        let Some(assembly) = self.assembling.take() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let decision = self.flow.admit(std::time::Instant::now());
        if decision.stopped {
            out.push(Method::MessageStop {
                destination: String::new(),
            });
        }
        if let Some(credit) = decision.emit_credit {
            out.push(Method::MessageFlow {
                destination: String::new(),
                unit: crate::frame::CreditUnit::Message,
                value: credit,
            });
        }

        let sync = assembly
            .header
            .as_ref()
            .map(|h| h.sync)
            .unwrap_or(false);
        let requires_accept = assembly.requires_accept
            || assembly.header.as_ref().map(|h| h.requires_accept).unwrap_or(false);

        let handle = self.scheduler.next_handle();
        self.incomplete_rcv_msgs.insert(
            handle,
            IncompleteRcvMsgRecord {
                command_id: assembly.command_id,
                requires_accept,
                sync,
            },
        );

        let message = InboundMessage {
            destination: assembly.destination,
            header: assembly.header.unwrap_or_default(),
            content: assembly.buffer.freeze(),
        };
        let token = Box::new(SchedulingToken {
            scheduler: self.scheduler.clone(),
            handle,
        });
        self.sink.enqueue(message, token);
        out
    }

    /// §4.5 "Command dispatch". Returns every frame the caller must now
    /// send on the wire, in order.
    pub fn handle_command(&mut self, method: Method, id: u32) -> Vec<Method> {
        let mut out = Vec::new();
        let mut current_complete = true;
        let is_execution_sync = method.is_sync();

        if !is_execution_sync {
            match self.adapter.invoke(&method) {
                Ok(Some(value)) => out.push(Method::ExecutionResult {
                    command_id: id,
                    value,
                }),
                Ok(None) => {}
                Err(err) => {
                    let (code, description) = match err {
                        CommandError::NotImplemented => (
                            ExecutionErrorCode::NotImplemented,
                            "command not implemented".to_string(),
                        ),
                        CommandError::InvalidArgument(msg) => {
                            (ExecutionErrorCode::InvalidArgument, msg)
                        }
                    };
                    out.push(Method::ExecutionException {
                        error_code: code,
                        command_id: Some(id),
                        description,
                    });
                }
            }
        }

        if is_execution_sync && self.has_incomplete_below(id) {
            current_complete = false;
            self.pending_syncs.push_back(id);
        }

        if current_complete {
            self.receiver_completed.insert(id);
        }

        if is_execution_sync && current_complete {
            out.extend(self.flush());
        }

        out
    }

    fn has_incomplete_below(&self, id: u32) -> bool {
        self.receiver_completed.lowest_missing_from(0) < id
    }

    /// §4.5 "Content-message completion", invoked once per drained
    /// completion from the session's [`CompletionScheduler`].
    pub fn on_message_completed(&mut self, handle: CompletionHandle) -> Vec<Method> {
        let Some(record) = self.incomplete_rcv_msgs.remove(&handle) else {
            return Vec::new();
        };

        self.receiver_completed.insert(record.command_id);
        if record.requires_accept {
            self.accepted.insert(record.command_id);
        }

        let drained_any_sync = self.drain_pending_syncs();

        if record.sync || drained_any_sync {
            self.flush()
        } else {
            Vec::new()
        }
    }

    /// Drains the front of `pendingSyncs` for every id now covered by the
    /// completed prefix, marking each complete in turn (§4.5).
    fn drain_pending_syncs(&mut self) -> bool {
        let mut drained_any = false;
        loop {
            let Some(&front) = self.pending_syncs.front() else {
                break;
            };
            if self.receiver_completed.lowest_missing_from(0) > front {
                self.pending_syncs.pop_front();
                self.receiver_completed.insert(front);
                drained_any = true;
            } else {
                break;
            }
        }
        drained_any
    }

    /// Flushes pending `accept` then `completed` frames (§4.5 step 6 and
    /// "Content-message completion"'s final bullet).
    fn flush(&mut self) -> Vec<Method> {
        let mut out = Vec::new();
        if !self.accepted.is_empty() {
            out.push(Method::MessageAccept {
                transfers: std::mem::take(&mut self.accepted),
            });
        }
        out.push(Method::SessionCompleted {
            commands: self.receiver_completed.clone(),
            timely_reply: true,
        });
        out
    }

    /// Final flush at session close (§4.4 `close()`: "drains outstanding
    /// completions, emits any final session.completed").
    /// Cancels every still-registered [`IncompleteRcvMsgRecord`] through the
    /// [`CompletionScheduler`] (§3 `IncompleteRcvMsg::cancel`, §5 "Detaching
    /// a session cancels every in-flight IncompleteRcvMsg"). A completion
    /// the sink schedules for one of these handles after this call becomes
    /// a silent no-op instead of mutating `receiverIncomplete`.
    pub fn cancel_outstanding(&mut self) {
        for handle in self.incomplete_rcv_msgs.keys().copied().collect::<Vec<_>>() {
            self.scheduler.cancel(handle);
        }
        self.incomplete_rcv_msgs.clear();
    }

    pub fn flush_final(&mut self) -> Vec<Method> {
        for (_, outcome) in self.scheduler.drain() {
            debug_assert!(matches!(outcome, CompletionOutcome::Completed));
        }
        let handles: Vec<_> = self.incomplete_rcv_msgs.keys().copied().collect();
        let mut out = Vec::new();
        for handle in handles {
            out.extend(self.on_message_completed(handle));
        }
        if out.is_empty() && !self.receiver_completed.is_empty() {
            out.push(Method::SessionCompleted {
                commands: self.receiver_completed.clone(),
                timely_reply: true,
            });
        }
        out
    }

    /// §4.5 "Sender completion tracking": the next id the peer must use
    /// when acknowledging us.
    pub fn sender_command_point(&self) -> CommandPoint {
        self.command_point
    }

    /// Allocates the next sender-direction command id for `method`, records
    /// it as sender-incomplete and pushes it onto the replay buffer.
    pub fn sender_send(&mut self, method: Method) -> (u32, Method) {
        let id = self.command_point.command;
        self.command_point.command = self.command_point.command.wrapping_add(1);
        self.command_point.offset = 0;
        self.sender_incomplete.insert(id);
        if self.replay_buffer.len() >= self.config.replay_buffer_size {
            self.replay_buffer.pop_front();
        }
        self.replay_buffer.push_back((id, method.clone()));
        (id, method)
    }

    /// Narrows the sender-side incomplete set and releases replay buffer
    /// entries the peer has now confirmed (§4.5).
    pub fn sender_completed(&mut self, commands: &RangeSet) {
        for &(low, high) in commands.ranges() {
            self.sender_incomplete.remove_range(low, high);
        }
        let still_incomplete = &self.sender_incomplete;
        self.replay_buffer
            .retain(|(id, _)| still_incomplete.contains(*id));
    }

    pub fn sender_incomplete(&self) -> &RangeSet {
        &self.sender_incomplete
    }

    /// Sent commands after `last_known_complete`, for `resume`'s replay
    /// (§4.4).
    pub fn replay_after(&self, last_known_complete: u32) -> Vec<Method> {
        self.replay_buffer
            .iter()
            .filter(|(id, _)| *id > last_known_complete)
            .map(|(_, m)| m.clone())
            .collect()
    }
}
