//! Layered session error taxonomy (§1b, §7): an inner, exhaustively-matched
//! cause, an outer state-aware wrapper, and the public type exposed from
//! `lib.rs`.

use crate::frame::{CloseCode, ExecutionErrorCode};

/// A session-scoped exception (§7 `SessionException`): marks the session
/// exceptional, notifies whatever is watching it, and closes.
#[derive(Debug, Clone, thiserror::Error)]
#[error("session exception [{code:?}]: {description}")]
pub struct SessionException {
    pub code: ExecutionErrorCode,
    pub description: String,
}

/// Raised by `SessionState`'s own invariant checks; never escapes the
/// module boundary without being wrapped by [`SessionStateError`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionInnerError {
    #[error("session {0:?} is not attached to a channel")]
    NotAttached(super::SessionName),
    #[error("a detached session named {0:?} was not found for resume")]
    ResumeTargetNotFound(super::SessionName),
    #[error(transparent)]
    Exception(#[from] SessionException),
}

/// Adds "what was the session doing" context over [`SessionInnerError`].
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionStateError {
    #[error("during attach: {0}")]
    Attach(#[source] SessionInnerError),
    #[error("during resume: {0}")]
    Resume(#[source] SessionInnerError),
    #[error("during command dispatch: {0}")]
    Dispatch(#[source] SessionInnerError),
}

impl From<SessionStateError> for Error {
    fn from(err: SessionStateError) -> Self {
        match &err {
            SessionStateError::Attach(SessionInnerError::NotAttached(name))
            | SessionStateError::Resume(SessionInnerError::NotAttached(name))
            | SessionStateError::Dispatch(SessionInnerError::NotAttached(name)) => {
                Error::NotAttached(name.clone())
            }
            SessionStateError::Resume(SessionInnerError::ResumeTargetNotFound(name)) => {
                Error::ResumeTargetNotFound(name.clone())
            }
            SessionStateError::Attach(SessionInnerError::Exception(e))
            | SessionStateError::Resume(SessionInnerError::Exception(e))
            | SessionStateError::Dispatch(SessionInnerError::Exception(e)) => {
                Error::Exception(e.clone())
            }
            _ => Error::Internal(err.to_string()),
        }
    }
}

/// Public, session-scoped error exposed from `lib.rs`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("session {0:?} is not attached to a channel")]
    NotAttached(super::SessionName),
    #[error("a detached session named {0:?} was not found for resume")]
    ResumeTargetNotFound(super::SessionName),
    #[error(transparent)]
    Exception(#[from] SessionException),
    #[error("a resource limit was exceeded: {0}")]
    ResourceLimitExceeded(String),
    #[error("transaction rolled back after reconnect")]
    TransactionRolledBack,
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// The `channel.close`/`session.detached` code a connection-level
    /// handler should use when surfacing this error on the wire.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Error::Internal(_) => CloseCode::InternalError,
            _ => CloseCode::NormalClose,
        }
    }
}
