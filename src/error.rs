//! Error types for the cluster lock manager.
//!
//! Uses thiserror for derive macros. Caller-visible failures are limited to
//! API misuse, timeouts and manager shutdown; protocol-internal races are
//! resolved inside the manager and never surface here.

use crate::exit_codes;
use crate::locks::LockContext;
use crate::node::ClusterNode;
use thiserror::Error;

/// Main error type for lock manager operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// A lock operation was attempted before `start()`.
    #[error("lock manager has not been started")]
    NotStarted,

    /// The manager was stopped, either before the call or while it was blocked.
    #[error("lock manager has been stopped")]
    Stopped,

    /// `start()` was called on a manager that is already running or was stopped.
    #[error("lock manager cannot be started: {0}")]
    InvalidLifecycle(String),

    /// `unlock` was called by a context that does not hold the lock.
    #[error("lock '{lock}' is not held by {context} on {node}")]
    NotHolder {
        lock: String,
        context: LockContext,
        node: ClusterNode,
    },

    /// The lock still has an owner or queued requesters and cannot be removed.
    #[error("lock '{0}' is in use and cannot be removed")]
    LockBusy(String),

    /// Invalid argument (empty lock name, bad timeout, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The lock could not be acquired before the deadline.
    #[error("timed out acquiring lock '{lock}'{}", holder_suffix(.holder))]
    Timeout {
        lock: String,
        holder: Option<ClusterNode>,
    },

    /// The group transport could not deliver a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// Message encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration could not be read, parsed or validated.
    #[error("{0}")]
    Config(String),

    /// A simulation detected overlapping ownership of a lock.
    #[error("safety violation: {0}")]
    SafetyViolation(String),
}

fn holder_suffix(holder: &Option<ClusterNode>) -> String {
    match holder {
        Some(node) => format!(" (held by {})", node),
        None => String::new(),
    }
}

impl LockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::NotStarted
            | LockError::InvalidLifecycle(_)
            | LockError::NotHolder { .. }
            | LockError::LockBusy(_)
            | LockError::InvalidArgument(_)
            | LockError::Config(_) => exit_codes::USER_ERROR,
            LockError::Stopped | LockError::Timeout { .. } => exit_codes::LOCK_FAILURE,
            LockError::Transport(_) | LockError::Codec(_) => exit_codes::TRANSPORT_FAILURE,
            LockError::SafetyViolation(_) => exit_codes::SAFETY_VIOLATION,
        }
    }

    /// Errors a caller gets for using the manager in the wrong state.
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            LockError::NotStarted
                | LockError::Stopped
                | LockError::InvalidLifecycle(_)
                | LockError::NotHolder { .. }
                | LockError::LockBusy(_)
        )
    }

    /// Errors a caller gets for passing bad arguments.
    pub fn is_illegal_argument(&self) -> bool {
        matches!(self, LockError::InvalidArgument(_))
    }
}

/// Result type alias for lock manager operations.
pub type Result<T> = std::result::Result<T, LockError>;
