//! Typed frame and method descriptors used by the state machine.
//!
//! The wire codec (bit-level framing, encoding of primitive types) is an external
//! collaborator in this crate: frames arrive already decoded into [`Frame`], and
//! are handed to a transport sink already built. This module only describes the
//! *contract* between the codec and the engine, not how bytes become these types.

use bytes::Bytes;

use crate::rangeset::RangeSet;

/// The four frame types carried by the transport, per the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Method,
    Header,
    Content,
    Heartbeat,
}

/// Per-frame boundary flags. A content-bearing method frame with `bof && eof` is a
/// command; one with `bof` but not `eof` opens a multi-frame frameset that later
/// header/content frames append to until `eof && eos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    /// Beginning of frameset
    pub bof: bool,
    /// End of frameset
    pub eof: bool,
    /// Beginning of segment (first frame of the message)
    pub bos: bool,
    /// End of segment (last frame of the message)
    pub eos: bool,
}

impl FrameFlags {
    pub const fn solo() -> Self {
        Self {
            bof: true,
            eof: true,
            bos: true,
            eos: true,
        }
    }

    pub fn is_command(&self) -> bool {
        self.bof && self.eof
    }
}

/// A frame as handed from the transport to [`crate::channel::ChannelMux`].
#[derive(Debug)]
pub struct Frame {
    pub channel: u16,
    pub track: u8,
    pub flags: FrameFlags,
    pub frame_type: FrameType,
    pub body: FrameBody,
}

impl Frame {
    pub fn method(channel: u16, method: Method) -> Self {
        Self {
            channel,
            track: 0,
            flags: FrameFlags::solo(),
            frame_type: FrameType::Method,
            body: FrameBody::Method(method),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            track: 0,
            flags: FrameFlags::solo(),
            frame_type: FrameType::Heartbeat,
            body: FrameBody::Heartbeat,
        }
    }
}

#[derive(Debug)]
pub enum FrameBody {
    Method(Method),
    Header(MessageHeader),
    Content(Bytes),
    Heartbeat,
}

/// Application headers carried ahead of message content. Field contents beyond
/// `requires_accept`/`delivery_properties` are opaque to the session engine,
/// which only needs to know whether the assembled message needs an accept.
#[derive(Debug, Clone, Default)]
pub struct MessageHeader {
    pub requires_accept: bool,
    /// The frame-level "notify synchronously" bit carried by AMQP 0-10
    /// commands generally; for a content message it means completion must be
    /// flushed to the peer immediately rather than coalesced with a later
    /// batch (§4.5 "Content-message completion").
    pub sync: bool,
}

/// A statically known dispatch key for [`Method`], used by the per-connection-state
/// dispatch tables instead of a runtime handler registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodCode {
    ConnectionStart,
    ConnectionStartOk,
    ConnectionSecure,
    ConnectionSecureOk,
    ConnectionTune,
    ConnectionTuneOk,
    ConnectionOpen,
    ConnectionOpenOk,
    ConnectionClose,
    ConnectionCloseOk,

    ChannelOpen,
    ChannelOpenOk,
    ChannelClose,
    ChannelCloseOk,

    SessionAttach,
    SessionAttached,
    SessionDetach,
    SessionDetached,
    SessionRequestTimeout,
    SessionTimeout,
    SessionCommandPoint,
    SessionCompleted,
    SessionKnownCompleted,
    SessionFlush,

    ExecutionSync,
    ExecutionResult,
    ExecutionException,

    MessageTransfer,
    MessageAccept,
    MessageReject,
    MessageRelease,
    MessageFlow,
    MessageStop,
    MessageFlush,
}

/// Typed method bodies. Fields are limited to what the state machine acts on;
/// this is not a full AMQP 0-10 codec.
#[derive(Debug, Clone)]
pub enum Method {
    ConnectionStart {
        mechanisms: Vec<String>,
        locales: Vec<String>,
    },
    ConnectionStartOk {
        mechanism: String,
        response: Bytes,
        locale: String,
    },
    ConnectionSecure {
        challenge: Bytes,
    },
    ConnectionSecureOk {
        response: Bytes,
    },
    ConnectionTune {
        channel_max: u16,
        max_frame_size: u32,
        heartbeat_min: u16,
        heartbeat_max: u16,
    },
    ConnectionTuneOk {
        channel_max: u16,
        max_frame_size: u32,
        heartbeat: u16,
    },
    ConnectionOpen {
        virtual_host: Option<String>,
    },
    ConnectionOpenOk,
    ConnectionClose {
        code: CloseCode,
        text: String,
    },
    ConnectionCloseOk,

    ChannelOpen,
    ChannelOpenOk,
    ChannelClose {
        code: CloseCode,
        text: String,
    },
    ChannelCloseOk,

    SessionAttach {
        name: Bytes,
        force: bool,
    },
    SessionAttached {
        name: Bytes,
    },
    SessionDetach {
        name: Bytes,
    },
    SessionDetached {
        name: Bytes,
        code: DetachCode,
    },
    SessionRequestTimeout {
        timeout: u32,
    },
    SessionTimeout {
        timeout: u32,
    },
    SessionCommandPoint {
        command_id: u32,
        command_offset: u64,
    },
    SessionCompleted {
        commands: RangeSet,
        timely_reply: bool,
    },
    SessionKnownCompleted {
        commands: RangeSet,
    },
    SessionFlush {
        expected: bool,
        confirmed: bool,
        completed: bool,
    },

    ExecutionSync,
    ExecutionResult {
        command_id: u32,
        value: Bytes,
    },
    ExecutionException {
        error_code: ExecutionErrorCode,
        command_id: Option<u32>,
        description: String,
    },

    MessageTransfer {
        destination: String,
        requires_accept: bool,
    },
    MessageAccept {
        transfers: RangeSet,
    },
    MessageReject {
        transfers: RangeSet,
        code: u16,
        text: String,
    },
    MessageRelease {
        transfers: RangeSet,
        set_redelivered: bool,
    },
    MessageFlow {
        destination: String,
        unit: CreditUnit,
        value: u32,
    },
    MessageStop {
        destination: String,
    },
    MessageFlush {
        destination: String,
    },
}

impl Method {
    pub fn code(&self) -> MethodCode {
        match self {
            Method::ConnectionStart { .. } => MethodCode::ConnectionStart,
            Method::ConnectionStartOk { .. } => MethodCode::ConnectionStartOk,
            Method::ConnectionSecure { .. } => MethodCode::ConnectionSecure,
            Method::ConnectionSecureOk { .. } => MethodCode::ConnectionSecureOk,
            Method::ConnectionTune { .. } => MethodCode::ConnectionTune,
            Method::ConnectionTuneOk { .. } => MethodCode::ConnectionTuneOk,
            Method::ConnectionOpen { .. } => MethodCode::ConnectionOpen,
            Method::ConnectionOpenOk => MethodCode::ConnectionOpenOk,
            Method::ConnectionClose { .. } => MethodCode::ConnectionClose,
            Method::ConnectionCloseOk => MethodCode::ConnectionCloseOk,
            Method::ChannelOpen => MethodCode::ChannelOpen,
            Method::ChannelOpenOk => MethodCode::ChannelOpenOk,
            Method::ChannelClose { .. } => MethodCode::ChannelClose,
            Method::ChannelCloseOk => MethodCode::ChannelCloseOk,
            Method::SessionAttach { .. } => MethodCode::SessionAttach,
            Method::SessionAttached { .. } => MethodCode::SessionAttached,
            Method::SessionDetach { .. } => MethodCode::SessionDetach,
            Method::SessionDetached { .. } => MethodCode::SessionDetached,
            Method::SessionRequestTimeout { .. } => MethodCode::SessionRequestTimeout,
            Method::SessionTimeout { .. } => MethodCode::SessionTimeout,
            Method::SessionCommandPoint { .. } => MethodCode::SessionCommandPoint,
            Method::SessionCompleted { .. } => MethodCode::SessionCompleted,
            Method::SessionKnownCompleted { .. } => MethodCode::SessionKnownCompleted,
            Method::SessionFlush { .. } => MethodCode::SessionFlush,
            Method::ExecutionSync => MethodCode::ExecutionSync,
            Method::ExecutionResult { .. } => MethodCode::ExecutionResult,
            Method::ExecutionException { .. } => MethodCode::ExecutionException,
            Method::MessageTransfer { .. } => MethodCode::MessageTransfer,
            Method::MessageAccept { .. } => MethodCode::MessageAccept,
            Method::MessageReject { .. } => MethodCode::MessageReject,
            Method::MessageRelease { .. } => MethodCode::MessageRelease,
            Method::MessageFlow { .. } => MethodCode::MessageFlow,
            Method::MessageStop { .. } => MethodCode::MessageStop,
            Method::MessageFlush { .. } => MethodCode::MessageFlush,
        }
    }

    /// Whether this method, once handled, must flush pending `accept`/`completed`
    /// frames before any further commands are considered complete (§4.5 step 6).
    pub fn is_sync(&self) -> bool {
        matches!(self, Method::ExecutionSync)
    }

    /// Whether this method frame carries content (i.e. begins a message assembly
    /// rather than being a standalone command).
    pub fn is_content_bearing(&self) -> bool {
        matches!(self, Method::MessageTransfer { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    NormalClose,
    ConnectionForced,
    FramingError,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachCode {
    Closed,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorCode {
    UnauthorizedAccess,
    NotFound,
    ResourceLocked,
    ResourceDeleted,
    IllegalState,
    CommandInvalid,
    ResourceLimitExceeded,
    NotAllowed,
    NotImplemented,
    InvalidArgument,
    InternalError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditUnit {
    Message,
    Byte,
}
