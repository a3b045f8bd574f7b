//! In-process lock service.
//!
//! Stores one lease per resource name with an owner and an expiry, and
//! arbitrates acquire-or-renew the way the lock sidecar does: the owner (or
//! anyone, once the lease expired) gets `Acquired`, everyone else `Conflict`.
//! Each [`MemoryLockChannel`] carries the identity of one client.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::channel::{QueryStatus, RemoteLockChannel, RenewStatus};
use crate::error::LockResult;

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: Instant,
}

/// Shared lease table.
#[derive(Debug, Clone)]
pub struct MemoryLockService {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
    ttl: Duration,
}

impl MemoryLockService {
    /// Create a service whose leases last `ttl` after each renewal.
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// A channel acting as `owner`.
    pub fn channel(&self, owner: impl Into<String>) -> MemoryLockChannel {
        MemoryLockChannel {
            owner: owner.into(),
            service: self.clone(),
        }
    }

    /// Current unexpired owner of `name`.
    pub fn owner(&self, name: &str) -> Option<String> {
        let now = Instant::now();
        self.leases
            .lock()
            .get(name)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.owner.clone())
    }

    /// Hand `name` to `owner` regardless of who holds it.
    pub fn force_owner(&self, name: &str, owner: impl Into<String>) {
        self.leases.lock().insert(
            name.to_owned(),
            Lease {
                owner: owner.into(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    fn exists(&self, name: &str) -> bool {
        self.leases.lock().contains_key(name)
    }

    fn acquire_or_renew(&self, name: &str, owner: &str) -> RenewStatus {
        let now = Instant::now();
        let mut leases = self.leases.lock();
        if let Some(lease) = leases.get(name) {
            if lease.owner != owner && lease.expires_at > now {
                return RenewStatus::Conflict;
            }
        }
        leases.insert(
            name.to_owned(),
            Lease {
                owner: owner.to_owned(),
                expires_at: now + self.ttl,
            },
        );
        RenewStatus::Acquired
    }
}

/// `RemoteLockChannel` backed by a [`MemoryLockService`].
#[derive(Debug, Clone)]
pub struct MemoryLockChannel {
    owner: String,
    service: MemoryLockService,
}

impl MemoryLockChannel {
    /// identity this channel acquires as
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[async_trait]
impl RemoteLockChannel for MemoryLockChannel {
    async fn query(&self, name: &str) -> LockResult<QueryStatus> {
        if self.service.exists(name) {
            Ok(QueryStatus::HeldBySomeone)
        } else {
            Ok(QueryStatus::Available)
        }
    }

    async fn acquire_or_renew(&self, name: &str) -> LockResult<RenewStatus> {
        let status = self.service.acquire_or_renew(name, &self.owner);
        trace!(lock = name, owner = %self.owner, ?status, "memory acquire-or-renew");
        Ok(status)
    }
}
