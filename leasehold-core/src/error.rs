//! Error types for lock acquisition and election.
//!
//! Callers can tell apart local misuse (reentrancy), transport failures,
//! protocol surprises and an exhausted retry budget. Errors returned by the
//! caller's own work are passed through untouched.

use thiserror::Error;

/// Which remote verb produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// existence/ownership lookup (GET)
    Query,
    /// acquire or renew (PUT)
    AcquireOrRenew,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verb::Query => f.write_str("query"),
            Verb::AcquireOrRenew => f.write_str("acquire-or-renew"),
        }
    }
}

/// Top-level error type for lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// `acquire` was called on a `Lock` that is already in use.
    #[error("locks are not reentrant: '{name}' is already held by this instance")]
    Reentrant {
        /// resource name
        name: String,
    },

    /// The lock service could not be reached or the call did not complete.
    #[error("transport error: {0}")]
    Transport(String),

    /// The lock service answered with a status outside the protocol.
    #[error("unexpected status from {verb}: {status}")]
    UnexpectedStatus {
        /// verb that got the response
        verb: Verb,
        /// status code received
        status: u16,
    },

    /// Acquire-or-renew reported the lock held by another owner.
    /// Only seen inside the retry loop.
    #[error("lock '{name}' is held by another owner")]
    Conflict {
        /// resource name
        name: String,
    },

    /// Conflict persisted for the whole retry budget.
    #[error("could not obtain a lock after {attempts} attempt(s)")]
    RetriesExhausted {
        /// attempts made before giving up
        attempts: u32,
    },

    /// The caller's cancellation token fired before the lock was acquired.
    #[error("lock acquisition cancelled")]
    Cancelled,

    /// Error returned by the work function, unchanged.
    #[error(transparent)]
    Work(anyhow::Error),
}

impl LockError {
    /// Returns true if the acquisition loop may try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Conflict { .. })
    }

    /// Returns true if this error aborts acquisition without any retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LockError::Reentrant { .. }
                | LockError::Transport(_)
                | LockError::UnexpectedStatus { .. }
        )
    }

    /// Returns the work function's error, if that is what this is.
    pub fn into_work_error(self) -> Option<anyhow::Error> {
        match self {
            LockError::Work(err) => Some(err),
            _ => None,
        }
    }
}

/// Shorthand result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;
