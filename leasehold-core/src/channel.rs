//! The two primitive operations against a named lock resource.
//!
//! `RemoteLockChannel` is what `Lock` talks to. The production
//! implementation is [`HttpLockChannel`]; tests and demos use the in-process
//! [`MemoryLockChannel`].
//!
//! [`HttpLockChannel`]: crate::http::HttpLockChannel
//! [`MemoryLockChannel`]: crate::memory::MemoryLockChannel

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{LockError, LockResult, Verb};

/// lock exists, or we hold it
pub const OK: u16 = 200;
/// lock does not exist
pub const NOT_FOUND: u16 = 404;
/// lock is held by another caller
pub const CONFLICT: u16 = 409;

/// Answer to a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// no record of the resource
    Available,
    /// the resource has a record. It may or may not be ours.
    HeldBySomeone,
}

impl QueryStatus {
    /// Map a protocol status code, anything but 200/404 is an error.
    pub fn from_status(status: u16) -> LockResult<Self> {
        match status {
            OK => Ok(QueryStatus::HeldBySomeone),
            NOT_FOUND => Ok(QueryStatus::Available),
            status => Err(LockError::UnexpectedStatus {
                verb: Verb::Query,
                status,
            }),
        }
    }
}

/// Answer to acquire-or-renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewStatus {
    /// acquired, or renewed by us
    Acquired,
    /// held by a different owner
    Conflict,
}

impl RenewStatus {
    /// Map a protocol status code, anything but 200/409 is an error.
    pub fn from_status(status: u16) -> LockResult<Self> {
        match status {
            OK => Ok(RenewStatus::Acquired),
            CONFLICT => Ok(RenewStatus::Conflict),
            status => Err(LockError::UnexpectedStatus {
                verb: Verb::AcquireOrRenew,
                status,
            }),
        }
    }
}

/// Query and acquire-or-renew against a lock-coordination service.
///
/// Implementations return [`LockError::Transport`] when the service cannot be
/// reached and [`LockError::UnexpectedStatus`] for responses outside the
/// protocol. They never retry; retrying is the `Lock`'s job.
#[async_trait]
pub trait RemoteLockChannel: Send + Sync + std::fmt::Debug + 'static {
    /// Does the resource exist?
    async fn query(&self, name: &str) -> LockResult<QueryStatus>;

    /// Take the resource, or extend our lease on it.
    async fn acquire_or_renew(&self, name: &str) -> LockResult<RenewStatus>;
}

#[async_trait]
impl<C: RemoteLockChannel + ?Sized> RemoteLockChannel for Arc<C> {
    async fn query(&self, name: &str) -> LockResult<QueryStatus> {
        (**self).query(name).await
    }

    async fn acquire_or_renew(&self, name: &str) -> LockResult<RenewStatus> {
        (**self).acquire_or_renew(name).await
    }
}

/// Build `<base>/locks/<name>`, tolerating a trailing slash on `base`.
pub fn lock_url(base: &str, name: &str) -> String {
    format!("{}/locks/{}", base.trim_end_matches('/'), name)
}
