//! Session command numbering, completion tracking and sync barriers (§3, §4.5).
//!
//! This is the heart of the engine (28% of the implementation budget). The
//! module is split the way the teacher splits `session/`: [`adapter`] defines
//! the out-of-scope semantic collaborator, [`state`] holds the pure,
//! synchronously-testable command/completion state machine, [`handler`] binds
//! one channel to at most one [`SessionState`], and [`engine`] drives the
//! per-session `tokio` actor described in SPEC_FULL.md §4.5's final
//! paragraph. [`builder`] assembles a [`SessionConfig`] through the
//! typestate pattern used throughout this crate (§1c), and [`error`] is the
//! layered `thiserror` taxonomy (§1b).

use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

mod adapter;
pub(crate) mod builder;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod handler;
pub(crate) mod state;

pub use adapter::{CommandAdapter, CommandError, NullCommandAdapter};
pub use builder::SessionEngineBuilder;
pub use error::{Error as SessionError, SessionException};
pub use handler::SessionHandler;
pub use state::SessionState;

/// Internal, immutable identity of a `SessionState`, used for tracing spans
/// (§1a) and as the key the worker-thread completion callback's weak handle
/// carries (§9 "arena ownership"). Distinct from [`SessionName`], the
/// wire-level binding key a client chooses in `session.attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The binary name a client supplies to `session.attach`/`session.resume`;
/// the binding key `SessionHandler::attach` is idempotent on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionName(Bytes);

impl SessionName {
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self(name.into())
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

/// The sender-direction cursor: the next command id this session will use,
/// and the byte offset within that command's frameset (§3). `command` is
/// strictly non-decreasing for the lifetime of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandPoint {
    pub command: u32,
    pub offset: u64,
}

/// Session-level tunables (§3 "Configuration"), assembled by
/// [`SessionEngineBuilder`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sent-command replay buffer capacity, used by `resume` (§4.4).
    pub replay_buffer_size: usize,
    /// How many completed commands accumulate before an unsolicited
    /// `session.completed` is flushed, independent of sync barriers.
    pub ack_frequency: u32,
    /// Per §6 "Persisted state", the timeout value actually advertised is
    /// always reported as zero regardless of what a client requests;
    /// `idle_timeout` here is only used locally for detecting a stalled peer.
    pub idle_timeout: Duration,
    pub flow: crate::flow::FlowConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            replay_buffer_size: 8192,
            ack_frequency: 1,
            idle_timeout: Duration::from_secs(60),
            flow: crate::flow::FlowConfig::unlimited(),
        }
    }
}
