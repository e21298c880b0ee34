//! The `CommandAdapter` collaborator: queue/exchange semantics (acking,
//! rejecting, releasing transfers, binding lookups) live outside this crate
//! (§1). `SessionState::handle_command` invokes one of these for every
//! non-content command it doesn't own the semantics of itself.

use bytes::Bytes;

use crate::frame::Method;

/// Command-scoped failure (§7): folded directly into `execution.exception`
/// by the dispatcher, never raised as a Rust error out of the engine.
#[derive(Debug, Clone)]
pub enum CommandError {
    NotImplemented,
    InvalidArgument(String),
}

/// External collaborator invoked for every non-content command the session
/// engine itself doesn't own the semantics of (`message.accept`,
/// `message.reject`, `message.release`, and anything the embedding broker
/// adds). `Ok(Some(value))` produces an `execution.result`; `Ok(None)` is a
/// handled command with no result; `Err` becomes `execution.exception`.
pub trait CommandAdapter: Send + Sync + 'static {
    fn invoke(&self, method: &Method) -> Result<Option<Bytes>, CommandError>;
}

/// An adapter that treats every command as unimplemented. Useful for tests
/// that only exercise the completion/ordering machinery and don't care
/// about command semantics.
#[derive(Debug, Default)]
pub struct NullCommandAdapter;

impl CommandAdapter for NullCommandAdapter {
    fn invoke(&self, _method: &Method) -> Result<Option<Bytes>, CommandError> {
        Err(CommandError::NotImplemented)
    }
}
